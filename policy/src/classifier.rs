// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The classifier data model: predicates, actions and prioritized rules.

use crate::bucket::CountBucket;
use net::{FieldMap, FieldValue, NativeField, UserPacket};
use std::sync::Arc;

/// A match over native header fields. `Any` matches every packet, `Empty`
/// matches none, `Match` requires the listed fields to carry the listed
/// values (absent fields are wildcards).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    Any,
    Empty,
    Match(FieldMap),
}

impl Predicate {
    /// A single-field match.
    #[must_use]
    pub fn on(field: NativeField, value: impl Into<FieldValue>) -> Predicate {
        let mut map = FieldMap::new();
        map.insert(field, value.into());
        Predicate::Match(map)
    }

    /// A multi-field match.
    #[must_use]
    pub fn from_fields<I>(fields: I) -> Predicate
    where
        I: IntoIterator<Item = (NativeField, FieldValue)>,
    {
        Predicate::Match(fields.into_iter().collect())
    }

    /// The field map of a `Match` predicate.
    #[must_use]
    pub fn match_fields(&self) -> Option<&FieldMap> {
        match self {
            Predicate::Match(map) => Some(map),
            _ => None,
        }
    }

    /// Whether a user packet satisfies the predicate. A required field
    /// that is absent from the packet does not match.
    #[must_use]
    pub fn matches(&self, packet: &UserPacket) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Empty => false,
            Predicate::Match(map) => map
                .iter()
                .all(|(field, value)| packet.get_native(*field) == Some(value)),
        }
    }

    /// Predicate conjunction. Conflicting required values collapse to
    /// `Empty`.
    #[must_use]
    pub fn intersect(&self, other: &Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Empty, _) | (_, Predicate::Empty) => Predicate::Empty,
            (Predicate::Any, p) | (p, Predicate::Any) => p.clone(),
            (Predicate::Match(a), Predicate::Match(b)) => {
                let mut merged = a.clone();
                for (field, value) in b {
                    if let Some(existing) = merged.get(field) {
                        if existing != value {
                            return Predicate::Empty;
                        }
                    } else {
                        merged.insert(*field, value.clone());
                    }
                }
                Predicate::Match(merged)
            }
        }
    }
}

/// One action of a classifier rule. `Drop` and `Controller` are
/// pipeline-internal sentinels; `Bucket` registers traffic accounting.
/// None of the three ever reaches the backend.
#[derive(Clone, Debug)]
pub enum Action {
    Drop,
    Controller,
    Modify(FieldMap),
    Bucket(Arc<CountBucket>),
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Action::Drop, Action::Drop) | (Action::Controller, Action::Controller) => true,
            (Action::Modify(a), Action::Modify(b)) => a == b,
            (Action::Bucket(a), Action::Bucket(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Action {}

/// A (match, actions) pair. Position within a classifier encodes priority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub pred: Predicate,
    pub actions: Vec<Action>,
}

impl Rule {
    #[must_use]
    pub fn new(pred: Predicate, actions: Vec<Action>) -> Self {
        Self { pred, actions }
    }
}

/// An ordered sequence of rules; earlier rules override later rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append another classifier's rules at lower priority.
    pub fn extend(&mut self, other: Classifier) {
        self.rules.extend(other.rules);
    }
}

impl FromIterator<Rule> for Classifier {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Classifier {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}
