// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! Live topology view of the switch fleet.
//!
//! [`graph::Topology`] is the undirected multigraph of switches, port
//! tables and links. [`network::ConcreteNetwork`] wraps it and translates
//! switch/port/link events from the backend into graph mutations, probing
//! for peers with discovery packets and signaling the runtime whenever the
//! topology structurally changed.

pub mod graph;
pub mod network;

pub use graph::{Port, Topology};
pub use network::{ConcreteNetwork, TopologyChange};
