// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The topology graph: switches, port tables and links.

use net::{Location, PortNo, SwitchId};
use std::collections::BTreeMap;

/// State of one switch port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    /// Administrative state: true when configured up.
    pub config: bool,
    /// Operational state: true when the link layer reports up.
    pub status: bool,
    /// The peer recorded by topology discovery, when linked.
    pub linked_to: Option<Location>,
}

impl Port {
    #[must_use]
    pub fn new(config: bool, status: bool) -> Self {
        Self {
            config,
            status,
            linked_to: None,
        }
    }

    /// Neither config nor status definitely reports the port down.
    /// Some datapaths report LINK_DOWN status for ports whose link is in
    /// fact up, so a single up indication is enough.
    #[must_use]
    pub fn possibly_up(&self) -> bool {
        self.config || self.status
    }
}

/// An undirected graph of switches. Each node carries a port table; each
/// edge records the port pair it runs over, stored against the normalized
/// (smaller, larger) switch pair.
///
/// Link invariant: an edge `(s1, s2)` over ports `(p1, p2)` exists exactly
/// when `port(s1, p1).linked_to == (s2, p2)` and symmetrically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeMap<SwitchId, BTreeMap<PortNo, Port>>,
    edges: BTreeMap<(SwitchId, SwitchId), (PortNo, PortNo)>,
}

fn edge_key(s1: SwitchId, s2: SwitchId) -> (SwitchId, SwitchId) {
    if s1 <= s2 { (s1, s2) } else { (s2, s1) }
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a switch with an empty port table. Returns false when the
    /// switch was already present.
    pub fn add_switch(&mut self, switch: SwitchId) -> bool {
        match self.nodes.entry(switch) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(BTreeMap::new());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Remove a switch and its port table.
    pub fn remove_switch(&mut self, switch: SwitchId) -> Option<BTreeMap<PortNo, Port>> {
        self.nodes.remove(&switch)
    }

    #[must_use]
    pub fn contains_switch(&self, switch: SwitchId) -> bool {
        self.nodes.contains_key(&switch)
    }

    /// All switch identifiers, in ascending order.
    pub fn switches(&self) -> impl Iterator<Item = SwitchId> + '_ {
        self.nodes.keys().copied()
    }

    /// The port table of one switch.
    #[must_use]
    pub fn ports(&self, switch: SwitchId) -> Option<&BTreeMap<PortNo, Port>> {
        self.nodes.get(&switch)
    }

    /// Add a port to a switch. Returns false when the switch is unknown.
    pub fn add_port(&mut self, switch: SwitchId, port: PortNo, config: bool, status: bool) -> bool {
        match self.nodes.get_mut(&switch) {
            Some(ports) => {
                ports.insert(port, Port::new(config, status));
                true
            }
            None => false,
        }
    }

    /// Remove a port entry.
    pub fn remove_port(&mut self, location: Location) -> Option<Port> {
        self.nodes
            .get_mut(&location.switch)
            .and_then(|ports| ports.remove(&location.port))
    }

    #[must_use]
    pub fn port(&self, location: Location) -> Option<&Port> {
        self.nodes
            .get(&location.switch)
            .and_then(|ports| ports.get(&location.port))
    }

    pub fn port_mut(&mut self, location: Location) -> Option<&mut Port> {
        self.nodes
            .get_mut(&location.switch)
            .and_then(|ports| ports.get_mut(&location.port))
    }

    /// Record an edge between two locations. The port pair is stored
    /// oriented to the normalized switch pair.
    pub fn set_edge(&mut self, a: Location, b: Location) {
        let key = edge_key(a.switch, b.switch);
        let ports = if key.0 == a.switch {
            (a.port, b.port)
        } else {
            (b.port, a.port)
        };
        self.edges.insert(key, ports);
    }

    /// Remove the edge between two switches, tolerating its absence.
    pub fn remove_edge(&mut self, s1: SwitchId, s2: SwitchId) -> Option<(PortNo, PortNo)> {
        self.edges.remove(&edge_key(s1, s2))
    }

    /// The port pair of the edge between `s1` and `s2`, oriented so the
    /// first port belongs to `s1`.
    #[must_use]
    pub fn edge_between(&self, s1: SwitchId, s2: SwitchId) -> Option<(PortNo, PortNo)> {
        let key = edge_key(s1, s2);
        self.edges.get(&key).map(|(p1, p2)| {
            if key.0 == s1 { (*p1, *p2) } else { (*p2, *p1) }
        })
    }

    /// All edges as (location, location) pairs in normalized order.
    pub fn edges(&self) -> impl Iterator<Item = (Location, Location)> + '_ {
        self.edges.iter().map(|((s1, s2), (p1, p2))| {
            (Location::new(*s1, *p1), Location::new(*s2, *p2))
        })
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check the link invariant: every edge's endpoints reference each
    /// other through `linked_to`, and no stray `linked_to` exists without
    /// its edge.
    #[must_use]
    pub fn links_consistent(&self) -> bool {
        let edges_ok = self.edges().all(|(a, b)| {
            self.port(a).is_some_and(|p| p.linked_to == Some(b))
                && self.port(b).is_some_and(|p| p.linked_to == Some(a))
        });
        let ports_ok = self.nodes.iter().all(|(switch, ports)| {
            ports.iter().all(|(port, entry)| match entry.linked_to {
                None => true,
                Some(peer) => {
                    self.edge_between(*switch, peer.switch)
                        == Some((*port, peer.port))
                }
            })
        });
        edges_ok && ports_ok
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_orientation_is_stable() {
        let mut topo = Topology::new();
        topo.add_switch(2);
        topo.add_switch(1);
        topo.add_port(1, 7, true, true);
        topo.add_port(2, 9, true, true);
        topo.set_edge(Location::new(2, 9), Location::new(1, 7));
        assert_eq!(topo.edge_between(1, 2), Some((7, 9)));
        assert_eq!(topo.edge_between(2, 1), Some((9, 7)));
    }

    #[test]
    fn link_invariant_detects_dangling_references() {
        let mut topo = Topology::new();
        topo.add_switch(1);
        topo.add_switch(2);
        topo.add_port(1, 1, true, true);
        topo.add_port(2, 1, true, true);
        topo.set_edge(Location::new(1, 1), Location::new(2, 1));
        assert!(!topo.links_consistent());

        topo.port_mut(Location::new(1, 1)).unwrap().linked_to = Some(Location::new(2, 1));
        topo.port_mut(Location::new(2, 1)).unwrap().linked_to = Some(Location::new(1, 1));
        assert!(topo.links_consistent());

        topo.remove_edge(1, 2);
        assert!(!topo.links_consistent());
    }
}
