// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! The policy runtime of the controller.
//!
//! Sits between a declarative forwarding policy and the switch backend.
//! Depending on the configured [`config::Mode`], packets punted to the
//! controller are interpreted directly, turned into reactively installed
//! microflow rules, or served by a proactively installed classifier that
//! is recompiled and re-pushed whenever the topology or a mutable
//! sub-policy changes. Topology-driven installs are fenced by a
//! generation counter so bursts of events collapse into the single
//! newest install.

pub mod config;
pub mod errors;
pub mod evcodec;
pub mod pipeline;
pub mod reactive;
mod runtime;
#[cfg(test)]
mod runtime_test;
pub mod tracker;
pub mod translate;
pub mod worker;

pub use config::{Mode, RuntimeParams, RuntimeParamsBuilder, Verbosity};
pub use errors::RuntimeError;
pub use evcodec::{EvCodecError, ExtendedValuesCodec, VlanCode};
pub use runtime::Runtime;
pub use translate::{PacketTranslator, TranslateError};
pub use worker::InstallWorker;
