// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! Policy interface consumed by the runtime.
//!
//! A policy is a tree of nodes stored in a [`arena::PolicyArena`] with
//! stable indices, so self-referential (recursion) policies can be tied
//! without ownership cycles. The runtime evaluates policies against user
//! packets ([`eval::eval`] / [`eval::track_eval`]), compiles them to
//! prioritized classifiers ([`eval::compile`]) and propagates topology
//! snapshots into them ([`eval::set_network`]). Classifier synthesis for
//! the richer combinator algebra is the job of an external policy
//! compiler; this crate provides the shapes the runtime itself needs.

pub mod arena;
pub mod bucket;
pub mod classifier;
pub mod eval;

pub use arena::{CombinatorKind, PolicyArena, PolicyChange, PolicyClass, PolicyError, PolicyId};
pub use bucket::{CountBucket, QueryKind};
pub use classifier::{Action, Classifier, Predicate, Rule};
pub use eval::{EvalTrace, compile, eval, set_network, track_eval};
