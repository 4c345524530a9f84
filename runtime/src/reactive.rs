// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reactive-0 rule synthesis.
//!
//! After an evaluated packet-in, the runtime installs a microflow rule so
//! the switch handles the next packet of the flow itself. The rule match
//! is the most specific field combination the packet supports, chosen by
//! explicit presence checks against a fixed ladder; the actions are the
//! per-field diffs between the input packet and each output packet.

#![allow(clippy::mutable_key_type)]

use crate::translate::{PacketTranslator, TranslateError};
use net::{ConcretePacket, FieldMap, NativeField, UserPacket};
use policy::Predicate;
use std::collections::HashSet;

/// Priority assigned to synthesized microflow rules. Reactive mode never
/// schedules the proactive pipeline, so this never contends with the
/// default punt entry.
pub const REACTIVE_PRIORITY: u16 = 0;

const FULL: [NativeField; 13] = [
    NativeField::Switch,
    NativeField::Inport,
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

const NO_VLAN: [NativeField; 11] = [
    NativeField::Switch,
    NativeField::Inport,
    NativeField::SrcMac,
    NativeField::DstMac,
    NativeField::EthType,
    NativeField::SrcIp,
    NativeField::DstIp,
    NativeField::Protocol,
    NativeField::Tos,
    NativeField::SrcPort,
    NativeField::DstPort,
];

const L3_VLAN: [NativeField; 10] = [
    NativeField::Switch,
    NativeField::Inport,
    NativeField::SrcMac,
    NativeField::DstMac,
    NativeField::EthType,
    NativeField::SrcIp,
    NativeField::DstIp,
    NativeField::Protocol,
    NativeField::VlanId,
    NativeField::VlanPcp,
];

const L3: [NativeField; 8] = [
    NativeField::Switch,
    NativeField::Inport,
    NativeField::SrcMac,
    NativeField::DstMac,
    NativeField::EthType,
    NativeField::SrcIp,
    NativeField::DstIp,
    NativeField::Protocol,
];

const L2_VLAN: [NativeField; 8] = [
    NativeField::Switch,
    NativeField::Inport,
    NativeField::SrcMac,
    NativeField::DstMac,
    NativeField::EthType,
    NativeField::Protocol,
    NativeField::VlanId,
    NativeField::VlanPcp,
];

const L2: [NativeField; 6] = [
    NativeField::Switch,
    NativeField::Inport,
    NativeField::SrcMac,
    NativeField::DstMac,
    NativeField::EthType,
    NativeField::Protocol,
];

const VLAN_ONLY: [NativeField; 2] = [NativeField::VlanId, NativeField::VlanPcp];

/// The cascade of field combinations, most specific first.
static CASCADE: [&[NativeField]; 7] = [
    &FULL, &NO_VLAN, &L3_VLAN, &L3, &L2_VLAN, &L2, &VLAN_ONLY,
];

/// The most specific match the packet supports: the first combination of
/// the cascade whose fields are all present. A packet supporting none of
/// them yields the no-match predicate (and the rule installs nothing).
#[must_use]
pub fn match_on_all_fields(packet: &ConcretePacket) -> Predicate {
    for combo in CASCADE {
        if packet.has_all(combo) {
            return Predicate::from_fields(
                combo
                    .iter()
                    .filter_map(|field| packet.get_native(*field).map(|v| (*field, v.clone()))),
            );
        }
    }
    Predicate::Empty
}

/// Fields a synthesized action may rewrite: the non-location native set
/// plus outport.
fn rewritable(field: NativeField) -> bool {
    !matches!(field, NativeField::Switch | NativeField::Inport)
}

/// Synthesize the microflow rule for one evaluated packet: the match over
/// the input packet, the reactive priority, and one rewrite map per
/// output packet holding only the fields that changed. An empty output
/// set yields a drop rule (no actions).
pub fn synthesize_rule(
    translator: &PacketTranslator,
    packet_in: &UserPacket,
    packets_out: &HashSet<UserPacket>,
) -> Result<(Predicate, u16, Vec<FieldMap>), TranslateError> {
    let concrete_in = translator.user_to_concrete(packet_in)?;
    let pred = match_on_all_fields(&concrete_in);

    let mut action_list = Vec::with_capacity(packets_out.len());
    for packet_out in packets_out {
        let concrete_out = translator.user_to_concrete(packet_out)?;
        let mut rewrites = FieldMap::new();
        for field in NativeField::ALL {
            if !rewritable(field) {
                continue;
            }
            let in_value = concrete_in.get_native(field);
            let out_value = concrete_out.get_native(field);
            if out_value != in_value {
                if let Some(value) = out_value {
                    rewrites.insert(field, value.clone());
                }
            }
        }
        action_list.push(rewrites);
    }
    Ok((pred, REACTIVE_PRIORITY, action_list))
}
