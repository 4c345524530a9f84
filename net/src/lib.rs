// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! Packet model for the policy runtime.
//!
//! This crate defines the two packet representations the runtime moves
//! between: the *concrete* packet (a flat map of recognized header names to
//! scalar values, the form the switch backend speaks) and the *user* packet
//! (typed headers plus arbitrary user-chosen metadata entries). It also
//! defines the wire-level boundary towards the switch backend: concrete
//! match maps, flow actions and the [`backend::SwitchBackend`] trait.

pub mod backend;
pub mod field;
pub mod headers;
pub mod mac;
pub mod packet;

pub use backend::{BackendError, BackendResult, FlowAction, SwitchBackend};
pub use field::{FieldError, FieldValue};
pub use headers::{ContentField, FieldMap, HeaderName, NativeField};
pub use mac::Mac;
pub use packet::{ConcretePacket, ExtendedValues, Location, PortNo, SwitchId, UserPacket};
