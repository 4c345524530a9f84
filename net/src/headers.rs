// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Header-name model: the native set, content headers and custom names.

use crate::field::FieldValue;
use std::collections::BTreeMap;
use std::fmt::Display;

/// The native header set: the fields a flow-table match can mention.
///
/// The *location* subset (switch, inport, outport) describes where a packet
/// is rather than what it carries.
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
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum NativeField {
    Switch,
    Inport,
    Outport,
    SrcMac,
    DstMac,
    EthType,
    SrcIp,
    DstIp,
    Protocol,
    Tos,
    SrcPort,
    DstPort,
    #[strum(serialize = "vlan_id")]
    VlanId,
    #[strum(serialize = "vlan_pcp")]
    VlanPcp,
}

impl NativeField {
    /// Every native header, in declaration order.
    pub const ALL: [NativeField; 14] = [
        NativeField::Switch,
        NativeField::Inport,
        NativeField::Outport,
        NativeField::SrcMac,
        NativeField::DstMac,
        NativeField::EthType,
        NativeField::SrcIp,
        NativeField::DstIp,
        NativeField::Protocol,
        NativeField::Tos,
        NativeField::SrcPort,
        NativeField::DstPort,
        NativeField::VlanId,
        NativeField::VlanPcp,
    ];

    /// The location subset.
    pub const LOCATION: [NativeField; 3] = [
        NativeField::Switch,
        NativeField::Inport,
        NativeField::Outport,
    ];

    /// True for switch, inport and outport.
    #[must_use]
    pub fn is_location(self) -> bool {
        matches!(
            self,
            NativeField::Switch | NativeField::Inport | NativeField::Outport
        )
    }
}

/// Raw payload fragments carried alongside the native headers.
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
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ContentField {
    Raw,
    HeaderLen,
    PayloadLen,
}

impl ContentField {
    /// Every content header.
    pub const ALL: [ContentField; 3] = [
        ContentField::Raw,
        ContentField::HeaderLen,
        ContentField::PayloadLen,
    ];
}

/// Any header name a packet may carry: native, content, or a user-chosen
/// custom name (the raw material of extended values).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderName {
    Native(NativeField),
    Content(ContentField),
    Custom(String),
}

impl HeaderName {
    /// True when the name belongs to the native set.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, HeaderName::Native(_))
    }

    /// True for a user-chosen name outside native and content sets.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, HeaderName::Custom(_))
    }
}

impl From<NativeField> for HeaderName {
    fn from(field: NativeField) -> Self {
        HeaderName::Native(field)
    }
}

impl From<ContentField> for HeaderName {
    fn from(field: ContentField) -> Self {
        HeaderName::Content(field)
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> Self {
        HeaderName::Custom(name.to_string())
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderName::Native(field) => field.fmt(f),
            HeaderName::Content(field) => field.fmt(f),
            HeaderName::Custom(name) => name.fmt(f),
        }
    }
}

/// A mapping from native header names to required (or rewritten) values.
/// Used both as the concrete form of a field match and as the wire form of
/// a header-rewrite action.
pub type FieldMap = BTreeMap<NativeField, FieldValue>;

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn native_names_round_trip() {
        for field in NativeField::ALL {
            let name = field.to_string();
            assert_eq!(NativeField::from_str(&name).unwrap(), field);
        }
        assert_eq!(NativeField::VlanId.to_string(), "vlan_id");
        assert_eq!(NativeField::SrcMac.to_string(), "srcmac");
        assert_eq!(NativeField::EthType.to_string(), "ethtype");
    }

    #[test]
    fn location_is_a_native_subset() {
        for field in NativeField::LOCATION {
            assert!(field.is_location());
            assert!(NativeField::ALL.contains(&field));
        }
        assert!(!NativeField::SrcMac.is_location());
    }
}
