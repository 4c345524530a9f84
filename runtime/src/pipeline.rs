// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The classifier installation pipeline.
//!
//! Turns a compiled classifier into concrete flow entries: drop sentinels
//! are erased (a drop is the *absence* of forwarding), punts supersede any
//! other behavior, bucket references are registered and stripped, rewrite
//! maps are conflated, and L3 rules are specialized per ethertype before
//! priorities are assigned and the rules fanned out across the switch
//! fleet. A backend failure on one switch never stops the remaining
//! switches from being programmed; the next generation overwrites
//! whatever state was left behind.

use net::{BackendResult, FieldValue, FlowAction, NativeField, SwitchBackend, SwitchId};
use policy::{Action, Classifier, Predicate, Rule};
use tracing::warn;

/// Priority of the default punt-to-controller entry installed by a reset.
pub const DEFAULT_PUNT_PRIORITY: u16 = 32_768;

/// Classifier priorities descend one per rule from this base plus the
/// rule count.
pub const PRIORITY_BASE: u16 = 40_000;

pub const ETHTYPE_IPV4: u64 = 0x0800;
pub const ETHTYPE_ARP: u64 = 0x0806;

/// Erase `Drop` sentinels. A rule whose action list becomes empty encodes
/// an explicit drop by absence of forwarding.
#[must_use]
pub fn remove_drops(classifier: Classifier) -> Classifier {
    classifier
        .into_iter()
        .map(|rule| {
            let Rule { pred, actions } = rule;
            let actions = actions
                .into_iter()
                .filter(|action| !matches!(action, Action::Drop))
                .collect();
            Rule::new(pred, actions)
        })
        .collect()
}

/// A punt supersedes any other behavior of its rule.
#[must_use]
pub fn controllerify(classifier: Classifier) -> Classifier {
    classifier
        .into_iter()
        .map(|rule| {
            if rule.actions.iter().any(|a| matches!(a, Action::Controller)) {
                Rule::new(rule.pred, vec![Action::Controller])
            } else {
                rule
            }
        })
        .collect()
}

/// Register each rule's match with the buckets it references, then strip
/// the bucket actions: accounting happens out of band, not on the switch.
#[must_use]
pub fn bookkeep_buckets(classifier: Classifier) -> Classifier {
    classifier
        .into_iter()
        .map(|rule| {
            let Rule { pred, actions } = rule;
            let mut kept = Vec::with_capacity(actions.len());
            for action in actions {
                match action {
                    Action::Bucket(bucket) => bucket.add_match(pred.clone()),
                    other => kept.push(other),
                }
            }
            Rule::new(pred, kept)
        })
        .collect()
}

/// Keep only non-empty rewrite maps. Pre-condition: after the previous
/// steps a non-punt rule holds nothing but rewrites.
#[must_use]
pub fn conflate_modifies(classifier: Classifier) -> Classifier {
    classifier
        .into_iter()
        .map(|rule| {
            if rule.actions.as_slice() == [Action::Controller] {
                return rule;
            }
            let Rule { pred, actions } = rule;
            let actions = actions
                .into_iter()
                .filter(|action| matches!(action, Action::Modify(map) if !map.is_empty()))
                .collect();
            Rule::new(pred, actions)
        })
        .collect()
}

/// Split every rule that matches on IP fields without an ethertype into
/// IPv4 and ARP copies, preserving rule order. IP fields are only
/// meaningful for those ethertypes and most datapaths require the
/// qualifier.
#[must_use]
pub fn layer3_specialize(classifier: Classifier) -> Classifier {
    let mut rules = Vec::with_capacity(classifier.len());
    for rule in classifier {
        let needs_split = rule.pred.match_fields().is_some_and(|map| {
            (map.contains_key(&NativeField::SrcIp) || map.contains_key(&NativeField::DstIp))
                && !map.contains_key(&NativeField::EthType)
        });
        if needs_split {
            rules.push(Rule::new(
                rule.pred
                    .intersect(&Predicate::on(NativeField::EthType, ETHTYPE_IPV4)),
                rule.actions.clone(),
            ));
            rules.push(Rule::new(
                rule.pred
                    .intersect(&Predicate::on(NativeField::EthType, ETHTYPE_ARP)),
                rule.actions,
            ));
        } else {
            rules.push(rule);
        }
    }
    Classifier::from_rules(rules)
}

/// Lower a rule's actions to wire form. Sentinels must already have been
/// erased by the earlier stages.
fn wire_actions(actions: &[Action]) -> Vec<FlowAction> {
    debug_assert!(
        !actions
            .iter()
            .any(|a| matches!(a, Action::Drop | Action::Bucket(_))),
        "drop/bucket sentinel survived the pipeline"
    );
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Controller => Some(FlowAction::PuntToController),
            Action::Modify(map) => Some(FlowAction::Rewrite(map.clone())),
            Action::Drop | Action::Bucket(_) => None,
        })
        .collect()
}

/// Translate a predicate to its concrete form and install one flow entry.
/// An `Empty` predicate installs nothing.
pub fn install_rule(
    backend: &dyn SwitchBackend,
    pred: &Predicate,
    priority: u16,
    actions: &[FlowAction],
) -> BackendResult {
    let concrete = match pred {
        Predicate::Empty => return Ok(()),
        Predicate::Any => net::FieldMap::new(),
        Predicate::Match(map) => map.clone(),
    };
    backend.send_install(&concrete, priority, actions)
}

/// Bring a switch set to a known-clean state: barrier, clear, barrier,
/// then a default punt-to-controller entry per switch. Shared by the
/// clear-all job and the install pipeline.
pub fn reset_switches(backend: &dyn SwitchBackend, switches: &[SwitchId]) {
    for &switch in switches {
        if let Err(e) = backend.send_barrier(switch) {
            warn!("barrier to switch {switch} failed: {e}");
        }
        if let Err(e) = backend.send_clear(switch) {
            warn!("clear on switch {switch} failed: {e}");
        }
        if let Err(e) = backend.send_barrier(switch) {
            warn!("barrier to switch {switch} failed: {e}");
        }
        if let Err(e) = install_rule(
            backend,
            &Predicate::on(NativeField::Switch, switch),
            DEFAULT_PUNT_PRIORITY,
            &[FlowAction::PuntToController],
        ) {
            warn!("punt entry install on switch {switch} failed: {e}");
        }
    }
}

/// Run the transform stages over a compiled classifier and install the
/// result across the switch set, descending one priority unit per rule
/// from the rule count above [`PRIORITY_BASE`]. Switch-pinned rules land
/// on their switch only (and are skipped when it left the topology);
/// unpinned rules are installed once per switch with the switch match
/// intersected in. A final barrier is sent to every switch.
pub fn install_classifier(
    backend: &dyn SwitchBackend,
    switches: &[SwitchId],
    classifier: Classifier,
) {
    let classifier = remove_drops(classifier);
    let classifier = controllerify(classifier);
    let classifier = bookkeep_buckets(classifier);
    let classifier = conflate_modifies(classifier);
    let classifier = layer3_specialize(classifier);

    let rule_count = u16::try_from(classifier.len()).unwrap_or(u16::MAX - PRIORITY_BASE);
    let mut priority = PRIORITY_BASE.saturating_add(rule_count);
    for rule in classifier {
        let actions = wire_actions(&rule.actions);
        let pinned = rule
            .pred
            .match_fields()
            .and_then(|map| map.get(&NativeField::Switch));
        match pinned {
            Some(FieldValue::Int(switch)) => {
                if !switches.contains(switch) {
                    continue;
                }
                if let Err(e) = install_rule(backend, &rule.pred, priority, &actions) {
                    warn!("flow install on switch {switch} failed: {e}");
                }
            }
            Some(other) => {
                warn!("rule pins its switch to non-integer value {other}; skipped");
                continue;
            }
            None => {
                for &switch in switches {
                    let pred = rule
                        .pred
                        .intersect(&Predicate::on(NativeField::Switch, switch));
                    if let Err(e) = install_rule(backend, &pred, priority, &actions) {
                        warn!("flow install on switch {switch} failed: {e}");
                    }
                }
            }
        }
        priority = priority.saturating_sub(1);
    }
    for &switch in switches {
        if let Err(e) = backend.send_barrier(switch) {
            warn!("barrier to switch {switch} failed: {e}");
        }
    }
}
