// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Coordinator-level tests driving the runtime against a recording
//! backend.

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use crate::config::{Mode, RuntimeParams, RuntimeParamsBuilder};
    use crate::pipeline::PRIORITY_BASE;
    use crate::reactive::REACTIVE_PRIORITY;
    use crate::runtime::Runtime;
    use net::backend::{BackendCall, RecordingBackend};
    use net::{ConcretePacket, FieldMap, FieldValue, FlowAction, Mac, NativeField};
    use policy::{Action, Classifier, Predicate, PolicyArena, PolicyId, QueryKind, Rule};
    use std::sync::Arc;
    use topology::Topology;
    use tracing_test::traced_test;

    fn params(mode: Mode) -> RuntimeParams {
        RuntimeParamsBuilder::default().mode(mode).build().unwrap()
    }

    fn forward_policy(arena: &mut PolicyArena, outport: u64) -> PolicyId {
        let mut map = FieldMap::new();
        map.insert(NativeField::Outport, FieldValue::Int(outport));
        arena.modify(map)
    }

    fn l3_classifier() -> Classifier {
        let mut rewrite = FieldMap::new();
        rewrite.insert(
            NativeField::DstMac,
            FieldValue::Mac(Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])),
        );
        Classifier::from_rules(vec![Rule::new(
            Predicate::on(NativeField::SrcIp, FieldValue::from("10.0.0.1")),
            vec![Action::Modify(rewrite)],
        )])
    }

    fn packet_on(switch: u64) -> ConcretePacket {
        let mut pkt = ConcretePacket::new();
        pkt.set_native(NativeField::Switch, FieldValue::Int(switch));
        pkt.set_native(NativeField::Inport, FieldValue::Int(1));
        pkt.set_native(NativeField::SrcMac, FieldValue::Int(0xaa));
        pkt.set_native(NativeField::DstMac, FieldValue::Int(0xbb));
        pkt.set_native(NativeField::EthType, FieldValue::Int(0x0800));
        pkt.set_native(NativeField::Protocol, FieldValue::Int(6));
        pkt
    }

    fn sent_packets(backend: &RecordingBackend) -> Vec<ConcretePacket> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Packet(pkt) => Some(pkt),
                _ => None,
            })
            .collect()
    }

    fn install_count(backend: &RecordingBackend) -> usize {
        backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Install { .. }))
            .count()
    }

    fn clear_count(backend: &RecordingBackend) -> usize {
        backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Clear(_)))
            .count()
    }

    #[test]
    fn interpreted_outputs_are_sent() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = forward_policy(&mut arena, 2);
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Interpreted)).unwrap();

        runtime.handle_packet_in(&packet_on(1)).unwrap();
        let packets = sent_packets(&backend);
        assert_eq!(packets.len(), 1);
        assert_eq!(
            packets[0].get_native(NativeField::Outport),
            Some(&FieldValue::Int(2))
        );
        assert_eq!(install_count(&backend), 0);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn reactive_mode_synthesizes_a_microflow() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = forward_policy(&mut arena, 3);
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Reactive0)).unwrap();

        runtime.handle_packet_in(&packet_on(1)).unwrap();
        let installs: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Install {
                    pred,
                    priority,
                    actions,
                } => Some((pred, priority, actions)),
                _ => None,
            })
            .collect();
        assert_eq!(installs.len(), 1);
        let (pred, priority, actions) = &installs[0];
        assert_eq!(*priority, REACTIVE_PRIORITY);
        assert_eq!(pred.get(&NativeField::Switch), Some(&FieldValue::Int(1)));
        match actions.as_slice() {
            [FlowAction::Rewrite(map)] => {
                assert_eq!(map.get(&NativeField::Outport), Some(&FieldValue::Int(3)));
                assert_eq!(map.len(), 1);
            }
            other => panic!("expected one rewrite, got {other:?}"),
        }
        assert_eq!(sent_packets(&backend).len(), 1);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn queries_suppress_synthesis_but_packets_still_flow() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let (query, _bucket) = arena.query(QueryKind::CountPackets);
        let forward = forward_policy(&mut arena, 9);
        let root = arena.parallel(vec![query, forward]);
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Reactive0)).unwrap();

        runtime.handle_packet_in(&packet_on(1)).unwrap();
        assert_eq!(install_count(&backend), 0);
        assert_eq!(sent_packets(&backend).len(), 1);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn proactive_topology_update_installs_the_classifier() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = arena.precompiled(l3_classifier());
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Proactive0)).unwrap();

        runtime.handle_switch_join(1);
        assert_eq!(runtime.generation(), 1);
        assert_eq!(runtime.prev_topology(), runtime.topology());
        runtime.shutdown().unwrap();

        assert_eq!(clear_count(&backend), 1);
        let classifier_installs: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Install {
                    pred, priority, ..
                } if priority > PRIORITY_BASE => Some(pred),
                _ => None,
            })
            .collect();
        // the L3 rule specialized into ipv4 and arp copies on switch 1
        assert_eq!(classifier_installs.len(), 2);
        for pred in &classifier_installs {
            assert_eq!(pred.get(&NativeField::Switch), Some(&FieldValue::Int(1)));
            assert!(pred.contains_key(&NativeField::EthType));
        }
        let calls = backend.calls();
        assert_eq!(calls.last(), Some(&BackendCall::Barrier(1)));
    }

    #[test]
    fn rapid_updates_coalesce_via_the_fence() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = arena.precompiled(l3_classifier());
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Proactive0)).unwrap();

        runtime.handle_switch_join(1);
        runtime.handle_switch_join(2);
        assert_eq!(runtime.generation(), 2);
        runtime.shutdown().unwrap();

        // only the newest job ran: both switches reset exactly once
        assert_eq!(clear_count(&backend), 2);
    }

    #[test]
    fn quiescent_events_do_not_bump_the_generation() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = arena.precompiled(l3_classifier());
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Proactive0)).unwrap();

        runtime.handle_switch_join(1);
        assert_eq!(runtime.generation(), 1);
        // a down port joining and an unknown link change nothing
        runtime.handle_port_join(1, 1, false, false);
        runtime.handle_link_update(1, 1, 7, 1);
        assert_eq!(runtime.generation(), 1);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn policy_change_during_a_network_update_is_coalesced() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let empty = arena.filter(Predicate::Empty);
        let any = arena.filter(Predicate::Any);
        // the inner policy is a function of the topology
        let dynamic = arena.dynamic_with_refresh(
            empty,
            Box::new(move |topo: &Topology| {
                if topo.contains_switch(1) {
                    Some(any)
                } else {
                    Some(empty)
                }
            }),
        );
        let mut runtime =
            Runtime::new(backend.clone(), arena, dynamic, params(Mode::Proactive0)).unwrap();

        // the join swaps the dynamic policy mid-update; the change must
        // not schedule a recompile of its own
        runtime.handle_switch_join(1);
        assert_eq!(runtime.arena().dynamic_inner(dynamic), Some(any));
        runtime.shutdown().unwrap();
        assert_eq!(clear_count(&backend), 1);
    }

    #[test]
    fn policy_change_outside_an_update_recompiles() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let old_inner = arena.precompiled(l3_classifier());
        let leaf = arena.filter(Predicate::Any);
        let nested_dynamic = arena.dynamic(leaf);
        let new_inner = arena.derived(nested_dynamic);
        let dynamic = arena.dynamic(old_inner);
        let mut runtime =
            Runtime::new(backend.clone(), arena, dynamic, params(Mode::Proactive0)).unwrap();

        runtime.handle_switch_join(1);
        runtime.set_dynamic_policy(dynamic, new_inner).unwrap();
        runtime.shutdown().unwrap();

        // the topology job and the policy-change job both reset switch 1
        assert_eq!(clear_count(&backend), 2);
        // the observer followed the swap into the new subtree
        assert!(runtime.arena().is_attached(nested_dynamic));
        assert!(runtime.arena().is_attached(dynamic));
    }

    #[test]
    fn reactive_policy_change_clears_the_fleet() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let old_inner = forward_policy(&mut arena, 2);
        let new_inner = forward_policy(&mut arena, 3);
        let dynamic = arena.dynamic(old_inner);
        let mut runtime =
            Runtime::new(backend.clone(), arena, dynamic, params(Mode::Reactive0)).unwrap();

        runtime.handle_switch_join(1);
        runtime.set_dynamic_policy(dynamic, new_inner).unwrap();
        runtime.shutdown().unwrap();

        // one fenced clear-all from the join, one unfenced from the swap
        assert_eq!(clear_count(&backend), 2);
        assert_eq!(install_count(&backend), 2); // the punt entry of each reset
    }

    #[traced_test]
    #[test]
    fn evaluation_failure_drops_the_packet() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = arena.recurse_placeholder();
        arena.tie_recurse(root, root).unwrap();
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Interpreted)).unwrap();

        runtime.handle_packet_in(&packet_on(1)).unwrap();
        assert!(sent_packets(&backend).is_empty());
        assert!(logs_contain("policy evaluation failed"));
        runtime.shutdown().unwrap();
    }

    #[test]
    fn an_unissued_vlan_pair_is_an_invariant_violation() {
        let backend = Arc::new(RecordingBackend::new());
        let mut arena = PolicyArena::new();
        let root = forward_policy(&mut arena, 2);
        let mut runtime =
            Runtime::new(backend.clone(), arena, root, params(Mode::Interpreted)).unwrap();

        let mut pkt = packet_on(1);
        pkt.set_native(NativeField::VlanId, FieldValue::Int(9));
        pkt.set_native(NativeField::VlanPcp, FieldValue::Int(0));
        assert!(runtime.handle_packet_in(&pkt).is_err());
        assert!(sent_packets(&backend).is_empty());
        runtime.shutdown().unwrap();
    }
}
