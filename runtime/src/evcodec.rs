// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The extended-values codec.
//!
//! User-defined packet metadata cannot cross a switch that only speaks
//! L2-L4 headers, so bundles are interned here and carried through the
//! fabric as a (vlan_id, vlan_pcp) pair. The paired maps are total
//! inverses of each other and never shrink for the lifetime of the
//! runtime; the combined code space is 15 bits wide and code 0 is
//! reserved, never issued.

use ahash::RandomState;
use net::ExtendedValues;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

/// Mask selecting the pcp bits of a code.
pub const PCP_MASK: u16 = 0b111_000_000_000_000;
/// Mask selecting the vlan-id bits of a code.
pub const VID_MASK: u16 = 0b000_111_111_111_111;
/// Largest code the combined 15-bit space can carry.
pub const MAX_CODE: u32 = 0b111_111_111_111_111;

/// The (vlan_id, vlan_pcp) pair assigned to one interned bundle. The pcp
/// half keeps its in-place bit position; the backend shifts as needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VlanCode {
    pub vid: u16,
    pub pcp: u16,
}

impl Display for VlanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.vid, self.pcp)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvCodecError {
    /// The 15-bit code space is exhausted.
    #[error("extended-values space exhausted: code {0} does not fit 15 bits")]
    EvOverflow(u32),

    /// Use of a vlan pair this controller never allocated.
    #[error("decode of vlan pair ({vid}, {pcp}) that was never issued")]
    UnknownCode { vid: u16, pcp: u16 },
}

#[derive(Default)]
struct EvDb {
    to_vlan: HashMap<ExtendedValues, VlanCode, RandomState>,
    from_vlan: HashMap<VlanCode, ExtendedValues, RandomState>,
}

/// Bijective map between extended-value bundles and vlan codes. One mutex
/// serializes both directions; encode and decode are the only entry
/// points.
#[derive(Default)]
pub struct ExtendedValuesCodec {
    db: Mutex<EvDb>,
}

impl ExtendedValuesCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a bundle. Returns the existing code when the bundle was seen
    /// before; otherwise allocates the next code `r = 1 + |db|` and splits
    /// it into its vid and pcp halves.
    pub fn encode(&self, bundle: &ExtendedValues) -> Result<VlanCode, EvCodecError> {
        let mut db = self.db.lock();
        if let Some(code) = db.to_vlan.get(bundle) {
            return Ok(*code);
        }
        // vlan zero is reserved, codes start at 1
        let next = db.to_vlan.len() as u32 + 1;
        if next > MAX_CODE {
            return Err(EvCodecError::EvOverflow(next));
        }
        let next = next as u16;
        let code = VlanCode {
            vid: next & VID_MASK,
            pcp: next & PCP_MASK,
        };
        db.to_vlan.insert(bundle.clone(), code);
        db.from_vlan.insert(code, bundle.clone());
        Ok(code)
    }

    /// Look up the bundle a vlan pair stands for. A pair this codec never
    /// issued is an invariant violation: the controller may not observe a
    /// vlan it did not assign.
    pub fn decode(&self, vid: u16, pcp: u16) -> Result<ExtendedValues, EvCodecError> {
        let db = self.db.lock();
        db.from_vlan
            .get(&VlanCode { vid, pcp })
            .cloned()
            .ok_or(EvCodecError::UnknownCode { vid, pcp })
    }

    /// Number of interned bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.db.lock().to_vlan.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.lock().to_vlan.is_empty()
    }
}
