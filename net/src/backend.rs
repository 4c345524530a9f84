// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The switch-backend boundary.
//!
//! The runtime drives switches exclusively through [`SwitchBackend`]; the
//! wire forms here are the only action shapes a backend ever observes.
//! Pipeline-internal sentinels (drop, punt markers, bucket references)
//! never cross this boundary.

use crate::headers::FieldMap;
use crate::packet::{ConcretePacket, PortNo, SwitchId};

/// A flow-entry action in wire form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowAction {
    /// The reserved `{send_to_controller: 0}` form: punt to the controller.
    PuntToController,
    /// Rewrite the given header fields.
    Rewrite(FieldMap),
}

/// Errors a backend may surface on any switch operation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("switch {0} is unreachable")]
    SwitchUnreachable(SwitchId),

    #[error("backend i/o failure: {0}")]
    Io(String),
}

pub type BackendResult = Result<(), BackendError>;

/// Interface to the switch I/O backend.
///
/// An empty `pred` map is a wildcard match. An empty action list installs a
/// drop entry.
pub trait SwitchBackend: Send + Sync {
    /// Install a flow entry.
    fn send_install(&self, pred: &FieldMap, priority: u16, actions: &[FlowAction])
    -> BackendResult;

    /// Request a flush/sync point on a switch.
    fn send_barrier(&self, switch: SwitchId) -> BackendResult;

    /// Remove every flow entry on a switch.
    fn send_clear(&self, switch: SwitchId) -> BackendResult;

    /// Emit a packet from the controller.
    fn send_packet(&self, packet: &ConcretePacket) -> BackendResult;

    /// Emit a probe packet for topology discovery.
    fn inject_discovery_packet(&self, switch: SwitchId, port: PortNo) -> BackendResult;
}

#[cfg(any(test, feature = "testing"))]
pub use recording::{BackendCall, RecordingBackend};

#[cfg(any(test, feature = "testing"))]
mod recording {
    use super::{BackendError, BackendResult, FlowAction, SwitchBackend};
    use crate::field::FieldValue;
    use crate::headers::{FieldMap, NativeField};
    use crate::packet::{ConcretePacket, PortNo, SwitchId};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// One call observed at the backend boundary.
    #[derive(Clone, Debug, PartialEq)]
    pub enum BackendCall {
        Install {
            pred: FieldMap,
            priority: u16,
            actions: Vec<FlowAction>,
        },
        Barrier(SwitchId),
        Clear(SwitchId),
        Packet(ConcretePacket),
        Discovery(SwitchId, PortNo),
    }

    /// A backend double that records every call, with optional per-switch
    /// failure injection.
    #[derive(Default)]
    pub struct RecordingBackend {
        calls: Mutex<Vec<BackendCall>>,
        failing: Mutex<HashSet<SwitchId>>,
    }

    impl RecordingBackend {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent call addressed to `switch` fail.
        pub fn fail_switch(&self, switch: SwitchId) {
            self.failing.lock().insert(switch);
        }

        /// Snapshot of everything recorded so far.
        #[must_use]
        pub fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().clone()
        }

        /// Drain the record.
        pub fn take_calls(&self) -> Vec<BackendCall> {
            std::mem::take(&mut *self.calls.lock())
        }

        fn record(&self, switch: Option<SwitchId>, call: BackendCall) -> BackendResult {
            if let Some(switch) = switch {
                if self.failing.lock().contains(&switch) {
                    return Err(BackendError::SwitchUnreachable(switch));
                }
            }
            self.calls.lock().push(call);
            Ok(())
        }
    }

    impl SwitchBackend for RecordingBackend {
        fn send_install(
            &self,
            pred: &FieldMap,
            priority: u16,
            actions: &[FlowAction],
        ) -> BackendResult {
            let switch = match pred.get(&NativeField::Switch) {
                Some(FieldValue::Int(s)) => Some(*s),
                _ => None,
            };
            self.record(
                switch,
                BackendCall::Install {
                    pred: pred.clone(),
                    priority,
                    actions: actions.to_vec(),
                },
            )
        }

        fn send_barrier(&self, switch: SwitchId) -> BackendResult {
            self.record(Some(switch), BackendCall::Barrier(switch))
        }

        fn send_clear(&self, switch: SwitchId) -> BackendResult {
            self.record(Some(switch), BackendCall::Clear(switch))
        }

        fn send_packet(&self, packet: &ConcretePacket) -> BackendResult {
            self.record(None, BackendCall::Packet(packet.clone()))
        }

        fn inject_discovery_packet(&self, switch: SwitchId, port: PortNo) -> BackendResult {
            self.record(Some(switch), BackendCall::Discovery(switch, port))
        }
    }
}
