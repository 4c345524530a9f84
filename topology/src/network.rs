// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Event processing over the topology graph.
//!
//! `ConcreteNetwork` consumes the backend's switch/port/link events and
//! mutates the graph, probing newly usable ports with discovery packets.
//! Each handler reports whether the topology structurally changed so the
//! runtime can trigger a network update exactly when needed. Events racing
//! a departed switch (port-part after switch-part and friends) are
//! tolerated silently.

use crate::graph::Topology;
use net::{Location, PortNo, SwitchBackend, SwitchId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether an event handler structurally changed the topology.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TopologyChange {
    Changed,
    Unchanged,
}

impl TopologyChange {
    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, TopologyChange::Changed)
    }

    fn or(self, other: TopologyChange) -> TopologyChange {
        if self.changed() || other.changed() {
            TopologyChange::Changed
        } else {
            TopologyChange::Unchanged
        }
    }
}

/// The live network view: a topology graph plus the backend handle used to
/// probe ports for peers.
pub struct ConcreteNetwork {
    topology: Topology,
    backend: Arc<dyn SwitchBackend>,
}

impl ConcreteNetwork {
    #[must_use]
    pub fn new(backend: Arc<dyn SwitchBackend>) -> Self {
        Self {
            topology: Topology::new(),
            backend,
        }
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn inject_discovery(&self, switch: SwitchId, port: PortNo) {
        if let Err(e) = self.backend.inject_discovery_packet(switch, port) {
            warn!("failed to inject discovery packet on {switch}:{port}: {e}");
        }
    }

    pub fn handle_switch_join(&mut self, switch: SwitchId) -> TopologyChange {
        info!("switch {switch} connected");
        self.topology.add_switch(switch);
        TopologyChange::Changed
    }

    pub fn handle_switch_part(&mut self, switch: SwitchId) -> TopologyChange {
        info!("switch {switch} disconnected");
        let Some(ports) = self.topology.ports(switch) else {
            return TopologyChange::Unchanged;
        };
        let port_nos: Vec<PortNo> = ports.keys().copied().collect();
        for port in port_nos {
            self.remove_associated_link(Location::new(switch, port));
        }
        self.topology.remove_switch(switch);
        TopologyChange::Changed
    }

    pub fn handle_port_join(
        &mut self,
        switch: SwitchId,
        port: PortNo,
        config: bool,
        status: bool,
    ) -> TopologyChange {
        debug!("port join {switch}:{port} config={config} status={status}");
        if !self.topology.add_port(switch, port, config, status) {
            warn!("port join for unknown switch {switch}");
            return TopologyChange::Unchanged;
        }
        if config || status {
            self.inject_discovery(switch, port);
            TopologyChange::Changed
        } else {
            TopologyChange::Unchanged
        }
    }

    pub fn handle_port_part(&mut self, switch: SwitchId, port: PortNo) -> TopologyChange {
        debug!("port part {switch}:{port}");
        let location = Location::new(switch, port);
        if self.topology.port(location).is_none() {
            // the switch has already been removed by a switch-part
            return TopologyChange::Unchanged;
        }
        self.remove_associated_link(location);
        self.topology.remove_port(location);
        TopologyChange::Changed
    }

    pub fn handle_port_mod(
        &mut self,
        switch: SwitchId,
        port: PortNo,
        config: bool,
        status: bool,
    ) -> TopologyChange {
        debug!("port mod {switch}:{port} config={config} status={status}");
        let location = Location::new(switch, port);
        let Some(entry) = self.topology.port_mut(location) else {
            warn!("port mod for unknown port {location}; treating as port-down");
            return self.port_down(switch, port, false);
        };
        let (prev_config, prev_status) = (entry.config, entry.status);
        entry.config = config;
        entry.status = status;

        let mut outcome = TopologyChange::Unchanged;
        if prev_config && !config {
            outcome = outcome.or(self.port_down(switch, port, false));
        }
        if prev_status && !status {
            outcome = outcome.or(self.port_down(switch, port, true));
        }
        if (!prev_config && config) || (!prev_status && status) {
            outcome = outcome.or(self.port_up(switch, port));
        }
        outcome
    }

    fn port_up(&mut self, switch: SwitchId, port: PortNo) -> TopologyChange {
        debug!("port up {switch}:{port}");
        self.inject_discovery(switch, port);
        TopologyChange::Changed
    }

    fn port_down(&mut self, switch: SwitchId, port: PortNo, double_check: bool) -> TopologyChange {
        debug!("port down {switch}:{port} double_check={double_check}");
        let location = Location::new(switch, port);
        if self.topology.port(location).is_none() {
            // the switch has already been removed by a switch-part
            return TopologyChange::Unchanged;
        }
        self.remove_associated_link(location);
        if double_check {
            // the status drop may be spurious; re-probe for a peer
            self.inject_discovery(switch, port);
        }
        TopologyChange::Changed
    }

    pub fn handle_link_update(
        &mut self,
        s1: SwitchId,
        p1: PortNo,
        s2: SwitchId,
        p2: PortNo,
    ) -> TopologyChange {
        let a = Location::new(s1, p1);
        let b = Location::new(s2, p2);
        let (Some(port1), Some(port2)) = (self.topology.port(a), self.topology.port(b)) else {
            debug!("link update {a} <-> {b}: at least one port not yet in topology");
            return TopologyChange::Unchanged;
        };
        let both_up = port1.possibly_up() && port2.possibly_up();

        let mut changed = false;
        if let Some((q1, q2)) = self.topology.edge_between(s1, s2) {
            if q1 == p1 && q2 == p2 {
                if both_up {
                    return TopologyChange::Unchanged;
                }
                warn!("link update {a} <-> {b} with bad port status");
                return TopologyChange::Unchanged;
            }
            // the link moved to a different port pair; drop the stale ends
            if q1 != p1 {
                changed |= self.remove_associated_link(Location::new(s1, q1));
            }
            if q2 != p2 {
                changed |= self.remove_associated_link(Location::new(s2, q2));
            }
        }

        if both_up {
            if let Some(port) = self.topology.port_mut(a) {
                port.linked_to = Some(b);
            }
            if let Some(port) = self.topology.port_mut(b) {
                port.linked_to = Some(a);
            }
            self.topology.set_edge(a, b);
            changed = true;
        }

        if changed {
            TopologyChange::Changed
        } else {
            TopologyChange::Unchanged
        }
    }

    /// Remove the link recorded at `location`, if any: drop the graph edge
    /// and clear `linked_to` on both endpoints. Already-removed state is
    /// tolerated. Returns true when an edge was actually removed.
    fn remove_associated_link(&mut self, location: Location) -> bool {
        let Some(port) = self.topology.port(location) else {
            return false;
        };
        let Some(peer) = port.linked_to else {
            return false;
        };
        let removed = self
            .topology
            .remove_edge(location.switch, peer.switch)
            .is_some();
        if let Some(peer_port) = self.topology.port_mut(peer) {
            peer_port.linked_to = None;
        }
        if let Some(own_port) = self.topology.port_mut(location) {
            own_port.linked_to = None;
        }
        removed
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use net::backend::{BackendCall, RecordingBackend};

    fn network() -> (ConcreteNetwork, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        (ConcreteNetwork::new(backend.clone()), backend)
    }

    #[test]
    fn port_flap_produces_three_updates() {
        let (mut net, _backend) = network();
        // setup: both switches known, the peer port already up
        assert!(net.handle_switch_join(1).changed());
        assert!(net.handle_switch_join(2).changed());
        assert!(net.handle_port_join(2, 1, true, true).changed());

        let mut updates = 0;

        // port 1 joins with status up
        if net.handle_port_join(1, 1, false, true).changed() {
            updates += 1;
        }
        // discovery reports the link
        if net.handle_link_update(1, 1, 2, 1).changed() {
            updates += 1;
        }
        assert_eq!(net.topology().edge_count(), 1);
        assert!(net.topology().links_consistent());

        // port 1 parts
        if net.handle_port_part(1, 1).changed() {
            updates += 1;
        }
        assert_eq!(updates, 3);
        assert_eq!(net.topology().edge_count(), 0);
        assert_eq!(
            net.topology().port(Location::new(2, 1)).unwrap().linked_to,
            None
        );
        assert!(net.topology().links_consistent());
    }

    #[test]
    fn link_update_is_idempotent_for_a_live_pair() {
        let (mut net, _backend) = network();
        net.handle_switch_join(1);
        net.handle_switch_join(2);
        net.handle_port_join(1, 1, true, true);
        net.handle_port_join(2, 1, true, true);
        assert!(net.handle_link_update(1, 1, 2, 1).changed());
        assert!(!net.handle_link_update(1, 1, 2, 1).changed());
        assert_eq!(net.topology().edge_count(), 1);
    }

    #[test]
    fn link_update_moves_to_a_new_port_pair() {
        let (mut net, _backend) = network();
        net.handle_switch_join(1);
        net.handle_switch_join(2);
        net.handle_port_join(1, 1, true, true);
        net.handle_port_join(1, 2, true, true);
        net.handle_port_join(2, 1, true, true);
        assert!(net.handle_link_update(1, 1, 2, 1).changed());
        assert!(net.handle_link_update(1, 2, 2, 1).changed());
        assert_eq!(net.topology().edge_between(1, 2), Some((2, 1)));
        assert_eq!(
            net.topology().port(Location::new(1, 1)).unwrap().linked_to,
            None
        );
        assert!(net.topology().links_consistent());
    }

    #[test]
    fn link_update_ignores_unknown_ports() {
        let (mut net, _backend) = network();
        net.handle_switch_join(1);
        net.handle_port_join(1, 1, true, true);
        assert!(!net.handle_link_update(1, 1, 2, 1).changed());
        assert_eq!(net.topology().edge_count(), 0);
    }

    #[test]
    fn switch_part_unlinks_every_peer() {
        let (mut net, _backend) = network();
        for switch in [1, 2, 3] {
            net.handle_switch_join(switch);
            net.handle_port_join(switch, 1, true, true);
        }
        net.handle_port_join(1, 2, true, true);
        net.handle_link_update(1, 1, 2, 1);
        net.handle_link_update(1, 2, 3, 1);
        assert_eq!(net.topology().edge_count(), 2);

        assert!(net.handle_switch_part(1).changed());
        assert_eq!(net.topology().edge_count(), 0);
        assert!(!net.topology().contains_switch(1));
        assert_eq!(
            net.topology().port(Location::new(2, 1)).unwrap().linked_to,
            None
        );
        assert!(net.topology().links_consistent());

        // a straggling part for the departed switch is swallowed
        assert!(!net.handle_port_part(1, 1).changed());
        assert!(!net.handle_switch_part(1).changed());
    }

    #[test]
    fn port_mod_transitions() {
        let (mut net, backend) = network();
        net.handle_switch_join(1);
        net.handle_switch_join(2);
        net.handle_port_join(1, 1, true, true);
        net.handle_port_join(2, 1, true, true);
        net.handle_link_update(1, 1, 2, 1);
        backend.take_calls();

        // status up -> down: link removed, re-probe scheduled
        assert!(net.handle_port_mod(1, 1, true, false).changed());
        assert_eq!(net.topology().edge_count(), 0);
        assert!(
            backend
                .calls()
                .contains(&BackendCall::Discovery(1, 1))
        );

        // down -> up: probe for a peer again
        backend.take_calls();
        assert!(net.handle_port_mod(1, 1, true, true).changed());
        assert_eq!(backend.calls(), vec![BackendCall::Discovery(1, 1)]);

        // no transition: nothing to do
        backend.take_calls();
        assert!(!net.handle_port_mod(1, 1, true, true).changed());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn port_join_only_probes_usable_ports() {
        let (mut net, backend) = network();
        net.handle_switch_join(1);
        assert!(!net.handle_port_join(1, 1, false, false).changed());
        assert!(backend.calls().is_empty());
        assert!(net.handle_port_join(1, 2, true, false).changed());
        assert_eq!(backend.calls(), vec![BackendCall::Discovery(1, 2)]);
    }
}
