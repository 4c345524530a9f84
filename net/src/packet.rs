// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Concrete and user packet representations.
//!
//! A *concrete* packet is the flat header map the switch backend delivers
//! and accepts. A *user* packet is what policies evaluate: the same headers
//! plus arbitrary user-chosen metadata entries, the truthy subset of which
//! forms the packet's *extended-values bundle*.

use crate::field::FieldValue;
use crate::headers::{ContentField, HeaderName, NativeField};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

/// OpenFlow-style datapath identifier.
pub type SwitchId = u64;

/// Port number on a switch.
pub type PortNo = u32;

/// A (switch, port) pair.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Location {
    pub switch: SwitchId,
    pub port: PortNo,
}

impl Location {
    #[must_use]
    pub fn new(switch: SwitchId, port: PortNo) -> Self {
        Self { switch, port }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.switch, self.port)
    }
}

/// An immutable, ordered bundle of user-chosen metadata entries.
///
/// Bundles are structural: equality, hashing and ordering follow the
/// (name, value) entries, which makes them usable as interning keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtendedValues(BTreeMap<String, FieldValue>);

impl ExtendedValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, FieldValue)> for ExtendedValues {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The flat header map exchanged with the switch backend. Only native and
/// content header names are ever populated; there is no guaranteed field
/// ordering at the wire, the map is ordered only for determinism.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConcretePacket {
    fields: BTreeMap<HeaderName, FieldValue>,
}

impl ConcretePacket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<HeaderName>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn set_native(&mut self, field: NativeField, value: FieldValue) {
        self.fields.insert(HeaderName::Native(field), value);
    }

    #[must_use]
    pub fn get(&self, name: &HeaderName) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn get_native(&self, field: NativeField) -> Option<&FieldValue> {
        self.fields.get(&HeaderName::Native(field))
    }

    /// True when every one of the given native headers is present.
    #[must_use]
    pub fn has_all(&self, fields: &[NativeField]) -> bool {
        fields.iter().all(|f| self.get_native(*f).is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &FieldValue)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(HeaderName, FieldValue)> for ConcretePacket {
    fn from_iter<T: IntoIterator<Item = (HeaderName, FieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// The packet representation policies evaluate.
///
/// Headers mix native, content and custom names; equality and hashing are
/// structural over the header map. The extended-values bundle (custom,
/// truthy entries) is extracted lazily and cached per packet instance;
/// every modification produces a new packet with a fresh cache.
#[derive(Clone, Debug, Default)]
pub struct UserPacket {
    headers: BTreeMap<HeaderName, FieldValue>,
    bundle: OnceCell<ExtendedValues>,
}

impl UserPacket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a packet with a decoded extended-values bundle: each entry
    /// becomes a custom header.
    #[must_use]
    pub fn with_extended_values(bundle: &ExtendedValues) -> Self {
        let headers = bundle
            .iter()
            .map(|(name, value)| (HeaderName::Custom(name.clone()), value.clone()))
            .collect();
        Self {
            headers,
            bundle: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &HeaderName) -> Option<&FieldValue> {
        self.headers.get(name)
    }

    #[must_use]
    pub fn get_native(&self, field: NativeField) -> Option<&FieldValue> {
        self.headers.get(&HeaderName::Native(field))
    }

    /// Produce a new packet with one header set.
    #[must_use]
    pub fn modify(self, name: impl Into<HeaderName>, value: FieldValue) -> Self {
        let mut headers = self.headers;
        headers.insert(name.into(), value);
        Self {
            headers,
            bundle: OnceCell::new(),
        }
    }

    /// Produce a new packet with every given header set.
    #[must_use]
    pub fn modify_many<I>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (HeaderName, FieldValue)>,
    {
        let mut headers = self.headers;
        for (name, value) in entries {
            headers.insert(name, value);
        }
        Self {
            headers,
            bundle: OnceCell::new(),
        }
    }

    pub fn headers(&self) -> impl Iterator<Item = (&HeaderName, &FieldValue)> {
        self.headers.iter()
    }

    /// The extended-values bundle: every custom header with a truthy value.
    /// Memoized per packet instance.
    pub fn extended_values(&self) -> &ExtendedValues {
        self.bundle.get_or_init(|| {
            self.headers
                .iter()
                .filter_map(|(name, value)| match name {
                    HeaderName::Custom(custom) if value.is_truthy() => {
                        Some((custom.clone(), value.clone()))
                    }
                    _ => None,
                })
                .collect()
        })
    }

    /// The content headers present on the packet.
    pub fn content_headers(&self) -> impl Iterator<Item = (ContentField, &FieldValue)> {
        self.headers.iter().filter_map(|(name, value)| match name {
            HeaderName::Content(field) => Some((*field, value)),
            _ => None,
        })
    }
}

impl PartialEq for UserPacket {
    fn eq(&self, other: &Self) -> bool {
        self.headers == other.headers
    }
}

impl Eq for UserPacket {}

impl Hash for UserPacket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.headers.hash(state);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::mutable_key_type)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_values_are_the_truthy_custom_subset() {
        let pkt = UserPacket::new()
            .modify(NativeField::Switch, FieldValue::Int(1))
            .modify(ContentField::Raw, FieldValue::Bytes(vec![1, 2, 3]))
            .modify("app", FieldValue::from("web"))
            .modify("hops", FieldValue::Int(0));
        let bundle = pkt.extended_values();
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.get("app"), Some(&FieldValue::from("web")));
        assert_eq!(bundle.get("hops"), None);
    }

    #[test]
    fn bundle_cache_resets_on_modify() {
        let pkt = UserPacket::new().modify("app", FieldValue::from("web"));
        assert_eq!(pkt.extended_values().len(), 1);
        let pkt = pkt.modify("tier", FieldValue::from("gold"));
        assert_eq!(pkt.extended_values().len(), 2);
    }

    #[test]
    fn equality_is_structural() {
        let a = UserPacket::new().modify("app", FieldValue::from("web"));
        let b = UserPacket::new().modify("app", FieldValue::from("web"));
        // force the cache on one side only
        let _ = a.extended_values();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn seeding_from_a_bundle_round_trips() {
        let mut bundle = ExtendedValues::new();
        bundle.insert("app", FieldValue::from("web"));
        bundle.insert("tier", FieldValue::Int(3));
        let pkt = UserPacket::with_extended_values(&bundle);
        assert_eq!(pkt.extended_values(), &bundle);
    }
}
