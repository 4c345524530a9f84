// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Traffic-accounting buckets referenced by classifier rules.

use crate::classifier::Predicate;
use parking_lot::Mutex;
use std::fmt;

/// The query flavors that route packets through the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum QueryKind {
    CapturePackets,
    CountPackets,
    CountBytes,
}

/// A counting bucket. The installation pipeline registers the match of
/// every rule that carries a bucket action, so the bucket can later query
/// switch counters for exactly the flows it covers.
#[derive(Default)]
pub struct CountBucket {
    matches: Mutex<Vec<Predicate>>,
}

impl CountBucket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule match with this bucket.
    pub fn add_match(&self, pred: Predicate) {
        self.matches.lock().push(pred);
    }

    /// Snapshot of the registered matches.
    #[must_use]
    pub fn matches(&self) -> Vec<Predicate> {
        self.matches.lock().clone()
    }
}

impl fmt::Debug for CountBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountBucket")
            .field("matches", &self.matches.lock().len())
            .finish()
    }
}
