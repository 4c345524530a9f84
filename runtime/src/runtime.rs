// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The runtime coordinator.
//!
//! Owns the policy tree, the live network view and the mode of operation,
//! and wires the pieces together: packet-ins are translated and evaluated
//! (with reactive microflow synthesis in reactive0 mode), topology events
//! mutate the network and trigger generation-fenced recompiles on the
//! install worker, and dynamic-policy swaps reconcile observers and
//! recompile unless a surrounding network update already does.
//!
//! The event dispatcher drives every handler through `&mut Runtime`, which
//! serializes network updates; the worker thread only ever receives
//! snapshots plus the shared atomic generation counter.

// UserPacket hashes only its header map; the bundle cache is not part of
// its identity.
#![allow(clippy::mutable_key_type)]

use crate::config::{Mode, RuntimeParams, Verbosity};
use crate::errors::RuntimeError;
use crate::evcodec::ExtendedValuesCodec;
use crate::pipeline::install_rule;
use crate::reactive::synthesize_rule;
use crate::tracker::{attach_all, reconcile_attachments};
use crate::translate::PacketTranslator;
use crate::worker::{InstallJob, InstallWorker};
use net::{ConcretePacket, FlowAction, PortNo, SwitchBackend, SwitchId, UserPacket};
use policy::{
    EvalTrace, PolicyArena, PolicyChange, PolicyClass, PolicyId, compile, eval, set_network,
    track_eval,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use topology::{ConcreteNetwork, Topology};
use tracing::{debug, error, info, warn};

/// The policy runtime.
pub struct Runtime {
    params: RuntimeParams,
    backend: Arc<dyn SwitchBackend>,
    network: ConcreteNetwork,
    prev_topology: Topology,
    arena: PolicyArena,
    root: PolicyId,
    codec: Arc<ExtendedValuesCodec>,
    translator: PacketTranslator,
    generation: Arc<AtomicU64>,
    in_update_network: bool,
    worker: InstallWorker,
}

impl Runtime {
    /// Start a runtime over the given backend and policy tree. In the
    /// compiled modes, every reachable dynamic sub-policy gets the
    /// runtime's change observer attached.
    pub fn new(
        backend: Arc<dyn SwitchBackend>,
        arena: PolicyArena,
        root: PolicyId,
        params: RuntimeParams,
    ) -> Result<Runtime, RuntimeError> {
        info!(
            "{}: starting policy runtime in {} mode",
            params.name, params.mode
        );
        let codec = Arc::new(ExtendedValuesCodec::new());
        let translator = PacketTranslator::new(codec.clone());
        let generation = Arc::new(AtomicU64::new(0));
        let worker = InstallWorker::start(backend.clone(), generation.clone())?;
        let network = ConcreteNetwork::new(backend.clone());
        let mut runtime = Runtime {
            params,
            backend,
            network,
            prev_topology: Topology::new(),
            arena,
            root,
            codec,
            translator,
            generation,
            in_update_network: false,
            worker,
        };
        if runtime.params.mode != Mode::Interpreted {
            let attached = attach_all(&mut runtime.arena, runtime.root);
            debug!("attached {attached} dynamic sub-policies");
        }
        Ok(runtime)
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.params.mode
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        self.network.topology()
    }

    /// Snapshot of the topology as of the last network update.
    #[must_use]
    pub fn prev_topology(&self) -> &Topology {
        &self.prev_topology
    }

    #[must_use]
    pub fn arena(&self) -> &PolicyArena {
        &self.arena
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn extended_values_codec(&self) -> &Arc<ExtendedValuesCodec> {
        &self.codec
    }

    #[must_use]
    pub fn translator(&self) -> &PacketTranslator {
        &self.translator
    }

    /// Stop the install worker after draining queued jobs.
    pub fn shutdown(&mut self) -> Result<(), RuntimeError> {
        self.worker.finish()
    }

    // ------------------------------------------------------------------
    // packet-in path
    // ------------------------------------------------------------------

    /// Handle a packet punted to the controller.
    ///
    /// Policy evaluation failures are logged and drop the packet; a vlan
    /// pair this runtime never issued is an invariant violation and
    /// surfaces as an error.
    pub fn handle_packet_in(&mut self, concrete: &ConcretePacket) -> Result<(), RuntimeError> {
        let packet = self.translator.concrete_to_user(concrete)?;
        if self.params.debug_packet_in {
            debug!("packet-in: {packet:?}");
        }
        let output = match self.params.mode {
            Mode::Interpreted | Mode::Proactive0 => {
                match eval(&self.arena, self.root, &packet) {
                    Ok(output) => output,
                    Err(e) => {
                        error!("policy evaluation failed: {e}; packet dropped");
                        HashSet::new()
                    }
                }
            }
            Mode::Reactive0 => match track_eval(&self.arena, self.root, &packet) {
                Ok((output, trace)) => {
                    self.reactive0(&packet, &output, &trace);
                    output
                }
                Err(e) => {
                    error!("policy evaluation failed: {e}; packet dropped");
                    HashSet::new()
                }
            },
        };
        if self.params.show_traces {
            info!("<<< recv {packet:?}");
            info!(">>> send {output:?}");
        }
        for packet_out in &output {
            self.send_packet(packet_out)?;
        }
        Ok(())
    }

    /// Reactive-0 microflow synthesis. Evaluations that touched a query
    /// must keep flowing through the controller and are not installed.
    fn reactive0(&self, packet_in: &UserPacket, output: &HashSet<UserPacket>, trace: &EvalTrace) {
        debug_assert_eq!(self.params.mode, Mode::Reactive0);
        if trace.contains_class(PolicyClass::CapturePackets)
            || trace.contains_class(PolicyClass::CountPackets)
            || trace.contains_class(PolicyClass::CountBytes)
        {
            return;
        }
        match synthesize_rule(&self.translator, packet_in, output) {
            Ok((pred, priority, rewrites)) => {
                let actions: Vec<FlowAction> =
                    rewrites.into_iter().map(FlowAction::Rewrite).collect();
                if self.params.verbosity == Verbosity::High {
                    debug!("installing reactive rule {pred:?} -> {actions:?}");
                }
                if let Err(e) = install_rule(self.backend.as_ref(), &pred, priority, &actions) {
                    warn!("reactive rule install failed: {e}");
                }
            }
            Err(e) => error!("reactive rule synthesis failed: {e}"),
        }
    }

    /// Translate a user packet and emit it through the backend.
    pub fn send_packet(&self, packet: &UserPacket) -> Result<(), RuntimeError> {
        let concrete = self.translator.user_to_concrete(packet)?;
        if let Err(e) = self.backend.send_packet(&concrete) {
            warn!("packet send failed: {e}");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // topology events
    // ------------------------------------------------------------------

    pub fn handle_switch_join(&mut self, switch: SwitchId) {
        if self.network.handle_switch_join(switch).changed() {
            self.update_network();
        }
    }

    pub fn handle_switch_part(&mut self, switch: SwitchId) {
        if self.network.handle_switch_part(switch).changed() {
            self.update_network();
        }
    }

    pub fn handle_port_join(&mut self, switch: SwitchId, port: PortNo, config: bool, status: bool) {
        if self
            .network
            .handle_port_join(switch, port, config, status)
            .changed()
        {
            self.update_network();
        }
    }

    pub fn handle_port_mod(&mut self, switch: SwitchId, port: PortNo, config: bool, status: bool) {
        if self
            .network
            .handle_port_mod(switch, port, config, status)
            .changed()
        {
            self.update_network();
        }
    }

    pub fn handle_port_part(&mut self, switch: SwitchId, port: PortNo) {
        if self.network.handle_port_part(switch, port).changed() {
            self.update_network();
        }
    }

    pub fn handle_link_update(&mut self, s1: SwitchId, p1: PortNo, s2: SwitchId, p2: PortNo) {
        if self.network.handle_link_update(s1, p1, s2, p2).changed() {
            self.update_network();
        }
    }

    // ------------------------------------------------------------------
    // recompilation
    // ------------------------------------------------------------------

    /// React to a structural topology change: bump the generation,
    /// snapshot the topology into the policy, and recompile per mode.
    /// Policy changes fired while the snapshot propagates are coalesced
    /// into this very update.
    pub fn update_network(&mut self) {
        let this_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "{}: network update, generation {this_generation}",
            self.params.name
        );
        self.in_update_network = true;
        let snapshot = self.network.topology().clone();
        self.prev_topology = snapshot.clone();
        let changes = set_network(&mut self.arena, self.root, &snapshot);
        for change in changes {
            self.handle_policy_change(&change);
        }
        match self.params.mode {
            Mode::Interpreted => {}
            Mode::Reactive0 => self.submit_clear_all(Some(this_generation)),
            Mode::Proactive0 => self.recompile_and_install(Some(this_generation)),
        }
        self.in_update_network = false;
    }

    /// Swap the inner policy of a dynamic node, notifying the change
    /// observer when one is attached.
    pub fn set_dynamic_policy(
        &mut self,
        dynamic: PolicyId,
        new_inner: PolicyId,
    ) -> Result<(), RuntimeError> {
        let change = self.arena.set_dynamic_inner(dynamic, new_inner)?;
        if change.old != change.new && self.arena.is_attached(dynamic) {
            self.handle_policy_change(&change);
        }
        Ok(())
    }

    fn handle_policy_change(&mut self, change: &PolicyChange) {
        debug!(
            "dynamic policy {} changed: {} -> {}",
            change.changed, change.old, change.new
        );
        reconcile_attachments(&mut self.arena, change.old, change.new);
        if self.in_update_network {
            // the surrounding network update recompiles with the new policy
            return;
        }
        match self.params.mode {
            Mode::Interpreted => {}
            Mode::Reactive0 => self.submit_clear_all(None),
            Mode::Proactive0 => self.recompile_and_install(None),
        }
    }

    fn recompile_and_install(&mut self, fence: Option<u64>) {
        match compile(&self.arena, self.root) {
            Ok(classifier) => {
                if self.params.verbosity == Verbosity::High {
                    debug!("compiled classifier: {classifier:?}");
                }
                let switches: Vec<SwitchId> = self.network.topology().switches().collect();
                self.worker.submit(InstallJob::Install {
                    classifier,
                    switches,
                    fence,
                });
            }
            Err(e) => error!("policy compilation failed: {e}"),
        }
    }

    fn submit_clear_all(&mut self, fence: Option<u64>) {
        let switches: Vec<SwitchId> = self.network.topology().switches().collect();
        self.worker.submit(InstallJob::ClearAll { switches, fence });
    }
}
