// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Policy evaluation, traced evaluation, compilation and topology
//! propagation.

// UserPacket hashes only its header map; the bundle cache is not part of
// its identity.
#![allow(clippy::mutable_key_type)]

use crate::arena::{CombinatorKind, PolicyArena, PolicyChange, PolicyClass, PolicyError, PolicyId, PolicyNode};
use crate::bucket::QueryKind;
use crate::classifier::{Action, Classifier, Predicate, Rule};
use net::{FieldMap, HeaderName, UserPacket};
use std::collections::{HashSet, VecDeque};
use topology::Topology;
use tracing::debug;

/// Limit on recursion-policy expansions during one evaluation.
const MAX_RECURSE_DEPTH: usize = 64;

/// The list of policy classes that participated in one evaluation.
#[derive(Clone, Debug, Default)]
pub struct EvalTrace {
    classes: Vec<PolicyClass>,
}

impl EvalTrace {
    fn record(&mut self, class: PolicyClass) {
        self.classes.push(class);
    }

    /// Whether any node of the given class participated.
    #[must_use]
    pub fn contains_class(&self, class: PolicyClass) -> bool {
        self.classes.contains(&class)
    }

    #[must_use]
    pub fn classes(&self) -> &[PolicyClass] {
        &self.classes
    }
}

/// Evaluate a policy against a user packet, yielding the (possibly empty)
/// set of output packets.
pub fn eval(
    arena: &PolicyArena,
    id: PolicyId,
    packet: &UserPacket,
) -> Result<HashSet<UserPacket>, PolicyError> {
    let mut trace = EvalTrace::default();
    eval_node(arena, id, packet, 0, &mut trace)
}

/// Evaluate a policy while recording which node classes participated.
pub fn track_eval(
    arena: &PolicyArena,
    id: PolicyId,
    packet: &UserPacket,
) -> Result<(HashSet<UserPacket>, EvalTrace), PolicyError> {
    let mut trace = EvalTrace::default();
    let output = eval_node(arena, id, packet, 0, &mut trace)?;
    Ok((output, trace))
}

fn apply_modify(packet: &UserPacket, map: &FieldMap) -> UserPacket {
    packet.clone().modify_many(
        map.iter()
            .map(|(field, value)| (HeaderName::Native(*field), value.clone())),
    )
}

fn eval_node(
    arena: &PolicyArena,
    id: PolicyId,
    packet: &UserPacket,
    depth: usize,
    trace: &mut EvalTrace,
) -> Result<HashSet<UserPacket>, PolicyError> {
    trace.record(arena.class_of(id));
    match arena.node(id) {
        PolicyNode::Filter(pred) => {
            let mut out = HashSet::new();
            if pred.matches(packet) {
                out.insert(packet.clone());
            }
            Ok(out)
        }
        PolicyNode::Modify(map) => {
            let mut out = HashSet::new();
            out.insert(apply_modify(packet, map));
            Ok(out)
        }
        PolicyNode::Static(classifier) => Ok(eval_classifier(classifier, packet)),
        // queries absorb the packet; accounting happens out of band
        PolicyNode::Query(_, _) => Ok(HashSet::new()),
        PolicyNode::Dynamic(_) | PolicyNode::Derived(_) => {
            let inner = arena.children(id);
            match inner.first() {
                Some(child) => eval_node(arena, *child, packet, depth, trace),
                None => Ok(HashSet::new()),
            }
        }
        PolicyNode::Recurse(inner) => {
            let inner = (*inner).ok_or(PolicyError::RecursionUnset(id))?;
            if depth >= MAX_RECURSE_DEPTH {
                return Err(PolicyError::RecursionDepthExceeded);
            }
            eval_node(arena, inner, packet, depth + 1, trace)
        }
        PolicyNode::Combinator(kind, children) => match kind {
            CombinatorKind::Parallel | CombinatorKind::Union => {
                let mut out = HashSet::new();
                for child in children {
                    out.extend(eval_node(arena, *child, packet, depth, trace)?);
                }
                Ok(out)
            }
            CombinatorKind::Sequential => {
                let mut current: VecDeque<UserPacket> = VecDeque::new();
                current.push_back(packet.clone());
                for child in children {
                    let mut next = HashSet::new();
                    for pkt in &current {
                        next.extend(eval_node(arena, *child, pkt, depth, trace)?);
                    }
                    current = next.into_iter().collect();
                }
                Ok(current.into_iter().collect())
            }
            CombinatorKind::Intersection => {
                let mut sets = children.iter();
                let Some(first) = sets.next() else {
                    return Ok(HashSet::new());
                };
                let mut out = eval_node(arena, *first, packet, depth, trace)?;
                for child in sets {
                    let other = eval_node(arena, *child, packet, depth, trace)?;
                    out.retain(|pkt| other.contains(pkt));
                }
                Ok(out)
            }
        },
    }
}

/// Interpret a precompiled classifier: the first matching rule fires and
/// its rewrite actions produce the outputs. Drop, punt and bucket actions
/// contribute no output packets at evaluation time.
fn eval_classifier(classifier: &Classifier, packet: &UserPacket) -> HashSet<UserPacket> {
    let mut out = HashSet::new();
    for rule in classifier.rules() {
        if rule.pred.matches(packet) {
            for action in &rule.actions {
                if let Action::Modify(map) = action {
                    out.insert(apply_modify(packet, map));
                }
            }
            break;
        }
    }
    out
}

/// Compile a policy to a classifier.
///
/// Leaves and parallel composition compile here; the richer combinator
/// algebra is the external policy compiler's concern.
pub fn compile(arena: &PolicyArena, id: PolicyId) -> Result<Classifier, PolicyError> {
    match arena.node(id) {
        PolicyNode::Filter(pred) => Ok(Classifier::from_rules(vec![
            Rule::new(pred.clone(), vec![Action::Modify(FieldMap::new())]),
            Rule::new(Predicate::Any, vec![Action::Drop]),
        ])),
        PolicyNode::Modify(map) => Ok(Classifier::from_rules(vec![Rule::new(
            Predicate::Any,
            vec![Action::Modify(map.clone())],
        )])),
        PolicyNode::Static(classifier) => Ok(classifier.clone()),
        PolicyNode::Query(QueryKind::CapturePackets, _) => Ok(Classifier::from_rules(vec![
            Rule::new(Predicate::Any, vec![Action::Controller]),
        ])),
        PolicyNode::Query(_, bucket) => Ok(Classifier::from_rules(vec![Rule::new(
            Predicate::Any,
            vec![Action::Bucket(bucket.clone())],
        )])),
        PolicyNode::Dynamic(_) | PolicyNode::Derived(_) => {
            let inner = arena.children(id);
            match inner.first() {
                Some(child) => compile(arena, *child),
                None => Ok(Classifier::new()),
            }
        }
        PolicyNode::Recurse(_) => Err(PolicyError::Uncompilable(PolicyClass::Recurse)),
        PolicyNode::Combinator(CombinatorKind::Parallel, children) => {
            let mut out = Classifier::new();
            for child in children {
                out.extend(compile(arena, *child)?);
            }
            Ok(out)
        }
        PolicyNode::Combinator(_, _) => Err(PolicyError::Uncompilable(PolicyClass::Combinator)),
    }
}

/// Propagate a topology snapshot into a policy tree: every reachable
/// dynamic node with a refresh hook recomputes its inner policy. Swaps on
/// attached nodes are reported so the runtime can reconcile observers and
/// recompile.
pub fn set_network(
    arena: &mut PolicyArena,
    root: PolicyId,
    topology: &Topology,
) -> Vec<PolicyChange> {
    let mut dynamics = Vec::new();
    let mut stack = vec![root];
    let mut seen: HashSet<PolicyId> = HashSet::new();
    while let Some(id) = stack.pop() {
        // recursion nodes are the only cycle points
        if arena.class_of(id) == PolicyClass::Recurse && !seen.insert(id) {
            continue;
        }
        if arena.class_of(id) == PolicyClass::Dynamic {
            dynamics.push(id);
        }
        stack.extend(arena.children(id));
    }

    let mut changes = Vec::new();
    for id in dynamics {
        let Some(new_inner) = arena.refresh_inner(id, topology) else {
            continue;
        };
        let Some(old_inner) = arena.dynamic_inner(id) else {
            continue;
        };
        if new_inner == old_inner {
            continue;
        }
        debug!("dynamic policy {id} refreshed: {old_inner} -> {new_inner}");
        if let Ok(change) = arena.set_dynamic_inner(id, new_inner) {
            if arena.is_attached(id) {
                changes.push(change);
            }
        }
    }
    changes
}
