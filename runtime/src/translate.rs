// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversion between user packets and concrete packets.
//!
//! Going down (user to concrete), location, native and content headers are
//! copied and a non-empty extended-values bundle is interned and stamped
//! onto the vlan pair. Coming up (concrete to user), a present vlan pair
//! is decoded back into the bundle and *consumed*: it never appears as a
//! header on the user packet. Address headers are coerced to their typed
//! representations on the way up.

use crate::evcodec::ExtendedValuesCodec;
use net::{
    ConcretePacket, ExtendedValues, FieldError, FieldValue, HeaderName, NativeField, UserPacket,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Codec(#[from] crate::evcodec::EvCodecError),

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Translates packets, sharing the process-wide extended-values codec.
pub struct PacketTranslator {
    codec: Arc<ExtendedValuesCodec>,
}

impl PacketTranslator {
    #[must_use]
    pub fn new(codec: Arc<ExtendedValuesCodec>) -> Self {
        Self { codec }
    }

    /// Lower a user packet to its concrete form.
    pub fn user_to_concrete(&self, packet: &UserPacket) -> Result<ConcretePacket, TranslateError> {
        let mut concrete = ConcretePacket::new();
        for field in NativeField::ALL {
            if let Some(value) = packet.get_native(field) {
                concrete.set_native(field, value.clone());
            }
        }
        for (field, value) in packet.content_headers() {
            concrete.set(field, value.clone());
        }
        let bundle = packet.extended_values();
        if !bundle.is_empty() {
            let code = self.codec.encode(bundle)?;
            concrete.set_native(NativeField::VlanId, FieldValue::from(code.vid));
            concrete.set_native(NativeField::VlanPcp, FieldValue::from(code.pcp));
        }
        Ok(concrete)
    }

    /// Lift a concrete packet to its user form, decoding the vlan pair
    /// back into the extended-values bundle when present.
    pub fn concrete_to_user(&self, packet: &ConcretePacket) -> Result<UserPacket, TranslateError> {
        let vlan = match (
            packet.get_native(NativeField::VlanId),
            packet.get_native(NativeField::VlanPcp),
        ) {
            (Some(FieldValue::Int(vid)), Some(FieldValue::Int(pcp))) => {
                Some((*vid as u16, *pcp as u16))
            }
            _ => None,
        };
        let bundle = match vlan {
            Some((vid, pcp)) => self.codec.decode(vid, pcp)?,
            None => ExtendedValues::new(),
        };
        let mut user = UserPacket::with_extended_values(&bundle);
        for (name, value) in packet.iter() {
            let value = match name {
                HeaderName::Native(NativeField::VlanId | NativeField::VlanPcp)
                    if vlan.is_some() =>
                {
                    continue;
                }
                HeaderName::Native(field) => FieldValue::coerce_for(*field, value.clone())?,
                _ => value.clone(),
            };
            user = user.modify(name.clone(), value);
        }
        Ok(user)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::evcodec::EvCodecError;
    use net::{ContentField, Mac};

    fn translator() -> PacketTranslator {
        PacketTranslator::new(Arc::new(ExtendedValuesCodec::new()))
    }

    fn sample_user_packet() -> UserPacket {
        UserPacket::new()
            .modify(NativeField::Switch, FieldValue::Int(1))
            .modify(NativeField::Inport, FieldValue::Int(3))
            .modify(
                NativeField::SrcMac,
                FieldValue::Mac(Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])),
            )
            .modify(NativeField::EthType, FieldValue::Int(0x0800))
            .modify(NativeField::SrcIp, FieldValue::Ip("10.0.0.1".parse().unwrap()))
            .modify(ContentField::Raw, FieldValue::Bytes(vec![0xde, 0xad]))
            .modify("app", FieldValue::from("web"))
    }

    #[test]
    fn round_trip_preserves_headers_and_bundle() {
        let translator = translator();
        let packet = sample_user_packet();
        let concrete = translator.user_to_concrete(&packet).unwrap();

        // the bundle rides the vlan pair
        assert_eq!(
            concrete.get_native(NativeField::VlanId),
            Some(&FieldValue::Int(1))
        );
        assert_eq!(
            concrete.get_native(NativeField::VlanPcp),
            Some(&FieldValue::Int(0))
        );

        let restored = translator.concrete_to_user(&concrete).unwrap();
        assert_eq!(restored, packet);
        // vlan headers were consumed by decoding
        assert_eq!(restored.get_native(NativeField::VlanId), None);
        assert_eq!(restored.get_native(NativeField::VlanPcp), None);
    }

    #[test]
    fn empty_bundle_sets_no_vlan() {
        let translator = translator();
        let packet = UserPacket::new().modify(NativeField::Switch, FieldValue::Int(7));
        let concrete = translator.user_to_concrete(&packet).unwrap();
        assert_eq!(concrete.get_native(NativeField::VlanId), None);
        assert_eq!(concrete.get_native(NativeField::VlanPcp), None);
        let restored = translator.concrete_to_user(&concrete).unwrap();
        assert!(restored.extended_values().is_empty());
    }

    #[test]
    fn falsy_metadata_is_not_interned() {
        let translator = translator();
        let packet = UserPacket::new()
            .modify(NativeField::Switch, FieldValue::Int(1))
            .modify("hops", FieldValue::Int(0));
        let concrete = translator.user_to_concrete(&packet).unwrap();
        assert_eq!(concrete.get_native(NativeField::VlanId), None);
    }

    #[test]
    fn addresses_are_coerced_on_the_way_up() {
        let translator = translator();
        let mut concrete = ConcretePacket::new();
        concrete.set_native(NativeField::SrcMac, FieldValue::Int(0x0000_aabb_ccdd_eeff));
        concrete.set_native(NativeField::DstIp, FieldValue::Str("10.0.0.2".to_string()));
        let user = translator.concrete_to_user(&concrete).unwrap();
        assert_eq!(
            user.get_native(NativeField::SrcMac),
            Some(&FieldValue::Mac(Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])))
        );
        assert_eq!(
            user.get_native(NativeField::DstIp),
            Some(&FieldValue::Ip("10.0.0.2".parse().unwrap()))
        );
    }

    #[test]
    fn unknown_vlan_pair_fails_decoding() {
        let translator = translator();
        let mut concrete = ConcretePacket::new();
        concrete.set_native(NativeField::VlanId, FieldValue::Int(9));
        concrete.set_native(NativeField::VlanPcp, FieldValue::Int(0));
        let err = translator.concrete_to_user(&concrete).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Codec(EvCodecError::UnknownCode { vid: 9, pcp: 0 })
        ));
    }
}
