// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Arena storage for policy trees.
//!
//! Nodes live in a flat arena and reference each other by stable
//! [`PolicyId`] indices, so self-referential recursion policies can be
//! tied after creation and the runtime can track mutable sub-policies by
//! identity rather than structure.

use crate::bucket::{CountBucket, QueryKind};
use crate::classifier::{Classifier, Predicate};
use net::FieldMap;
use std::fmt;
use std::sync::Arc;
use topology::Topology;

/// Stable index of a node in a [`PolicyArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyId(usize);

impl PolicyId {
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// How a combinator composes its children.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum CombinatorKind {
    Parallel,
    Sequential,
    Intersection,
    Union,
}

/// The class of a policy node, as reported in evaluation traces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum PolicyClass {
    Filter,
    Modify,
    Static,
    CapturePackets,
    CountPackets,
    CountBytes,
    Dynamic,
    Combinator,
    Recurse,
    Derived,
}

/// Recompute a dynamic node's inner policy from a topology snapshot.
/// Returning `None` keeps the current inner policy.
pub type NetworkRefresh = Box<dyn Fn(&Topology) -> Option<PolicyId> + Send + Sync>;

/// A mutable policy node: its inner policy can be swapped at runtime,
/// notifying the attached observer.
pub struct DynamicNode {
    inner: PolicyId,
    attached: bool,
    refresh: Option<NetworkRefresh>,
}

impl fmt::Debug for DynamicNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicNode")
            .field("inner", &self.inner)
            .field("attached", &self.attached)
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

/// One node of a policy tree.
#[derive(Debug)]
pub enum PolicyNode {
    /// Pass packets satisfying the predicate, drop the rest.
    Filter(Predicate),
    /// Rewrite the given header fields.
    Modify(FieldMap),
    /// A classifier produced by the external policy compiler.
    Static(Classifier),
    /// A query point; packets are absorbed into the bucket.
    Query(QueryKind, Arc<CountBucket>),
    /// A mutable sub-policy.
    Dynamic(DynamicNode),
    /// Composition of sub-policies.
    Combinator(CombinatorKind, Vec<PolicyId>),
    /// Self-referential policy; the inner link is tied after creation.
    Recurse(Option<PolicyId>),
    /// A policy defined in terms of another one.
    Derived(PolicyId),
}

/// A dynamic-policy swap report: `changed` is the dynamic node, `old` and
/// `new` its previous and current inner policies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PolicyChange {
    pub changed: PolicyId,
    pub old: PolicyId,
    pub new: PolicyId,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy {0} is not a dynamic policy")]
    NotDynamic(PolicyId),

    #[error("recursion policy {0} was never tied to an inner policy")]
    RecursionUnset(PolicyId),

    #[error("recursion policy {0} is already tied")]
    AlreadyTied(PolicyId),

    #[error("policy evaluation exceeded the recursion depth limit")]
    RecursionDepthExceeded,

    #[error("policy shape {0} requires the external classifier compiler")]
    Uncompilable(PolicyClass),
}

/// Arena of policy nodes.
#[derive(Debug, Default)]
pub struct PolicyArena {
    nodes: Vec<PolicyNode>,
}

impl PolicyArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: PolicyNode) -> PolicyId {
        let id = PolicyId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn filter(&mut self, pred: Predicate) -> PolicyId {
        self.push(PolicyNode::Filter(pred))
    }

    pub fn modify(&mut self, map: FieldMap) -> PolicyId {
        self.push(PolicyNode::Modify(map))
    }

    /// A leaf carrying a precompiled classifier.
    pub fn precompiled(&mut self, classifier: Classifier) -> PolicyId {
        self.push(PolicyNode::Static(classifier))
    }

    /// A query point. Returns the node and its bucket handle.
    pub fn query(&mut self, kind: QueryKind) -> (PolicyId, Arc<CountBucket>) {
        let bucket = Arc::new(CountBucket::new());
        let id = self.push(PolicyNode::Query(kind, bucket.clone()));
        (id, bucket)
    }

    pub fn dynamic(&mut self, inner: PolicyId) -> PolicyId {
        self.push(PolicyNode::Dynamic(DynamicNode {
            inner,
            attached: false,
            refresh: None,
        }))
    }

    /// A dynamic node whose inner policy is a function of the topology.
    pub fn dynamic_with_refresh(&mut self, inner: PolicyId, refresh: NetworkRefresh) -> PolicyId {
        self.push(PolicyNode::Dynamic(DynamicNode {
            inner,
            attached: false,
            refresh: Some(refresh),
        }))
    }

    pub fn combinator(&mut self, kind: CombinatorKind, children: Vec<PolicyId>) -> PolicyId {
        self.push(PolicyNode::Combinator(kind, children))
    }

    pub fn parallel(&mut self, children: Vec<PolicyId>) -> PolicyId {
        self.combinator(CombinatorKind::Parallel, children)
    }

    pub fn sequential(&mut self, children: Vec<PolicyId>) -> PolicyId {
        self.combinator(CombinatorKind::Sequential, children)
    }

    pub fn derived(&mut self, inner: PolicyId) -> PolicyId {
        self.push(PolicyNode::Derived(inner))
    }

    /// An untied recursion node; tie it with [`PolicyArena::tie_recurse`].
    pub fn recurse_placeholder(&mut self) -> PolicyId {
        self.push(PolicyNode::Recurse(None))
    }

    /// Tie a recursion node to its inner policy (possibly itself, through
    /// any chain of nodes).
    pub fn tie_recurse(&mut self, rec: PolicyId, inner: PolicyId) -> Result<(), PolicyError> {
        match self.nodes.get_mut(rec.index()) {
            Some(PolicyNode::Recurse(slot @ None)) => {
                *slot = Some(inner);
                Ok(())
            }
            Some(PolicyNode::Recurse(Some(_))) => Err(PolicyError::AlreadyTied(rec)),
            _ => Err(PolicyError::RecursionUnset(rec)),
        }
    }

    #[must_use]
    pub fn node(&self, id: PolicyId) -> &PolicyNode {
        &self.nodes[id.index()]
    }

    /// Direct children of a node.
    #[must_use]
    pub fn children(&self, id: PolicyId) -> Vec<PolicyId> {
        match self.node(id) {
            PolicyNode::Filter(_)
            | PolicyNode::Modify(_)
            | PolicyNode::Static(_)
            | PolicyNode::Query(_, _) => vec![],
            PolicyNode::Dynamic(node) => vec![node.inner],
            PolicyNode::Combinator(_, children) => children.clone(),
            PolicyNode::Recurse(inner) => match inner {
                Some(inner) => vec![*inner],
                None => vec![],
            },
            PolicyNode::Derived(inner) => vec![*inner],
        }
    }

    #[must_use]
    pub fn class_of(&self, id: PolicyId) -> PolicyClass {
        match self.node(id) {
            PolicyNode::Filter(_) => PolicyClass::Filter,
            PolicyNode::Modify(_) => PolicyClass::Modify,
            PolicyNode::Static(_) => PolicyClass::Static,
            PolicyNode::Query(QueryKind::CapturePackets, _) => PolicyClass::CapturePackets,
            PolicyNode::Query(QueryKind::CountPackets, _) => PolicyClass::CountPackets,
            PolicyNode::Query(QueryKind::CountBytes, _) => PolicyClass::CountBytes,
            PolicyNode::Dynamic(_) => PolicyClass::Dynamic,
            PolicyNode::Combinator(_, _) => PolicyClass::Combinator,
            PolicyNode::Recurse(_) => PolicyClass::Recurse,
            PolicyNode::Derived(_) => PolicyClass::Derived,
        }
    }

    /// Current inner policy of a dynamic node.
    #[must_use]
    pub fn dynamic_inner(&self, id: PolicyId) -> Option<PolicyId> {
        match self.node(id) {
            PolicyNode::Dynamic(node) => Some(node.inner),
            _ => None,
        }
    }

    /// Swap the inner policy of a dynamic node, reporting old and new.
    pub fn set_dynamic_inner(
        &mut self,
        id: PolicyId,
        new_inner: PolicyId,
    ) -> Result<PolicyChange, PolicyError> {
        match self.nodes.get_mut(id.index()) {
            Some(PolicyNode::Dynamic(node)) => {
                let old = node.inner;
                node.inner = new_inner;
                Ok(PolicyChange {
                    changed: id,
                    old,
                    new: new_inner,
                })
            }
            _ => Err(PolicyError::NotDynamic(id)),
        }
    }

    /// Attach the runtime's change observer to a dynamic node.
    pub fn attach(&mut self, id: PolicyId) -> Result<(), PolicyError> {
        match self.nodes.get_mut(id.index()) {
            Some(PolicyNode::Dynamic(node)) => {
                node.attached = true;
                Ok(())
            }
            _ => Err(PolicyError::NotDynamic(id)),
        }
    }

    /// Detach the change observer from a dynamic node.
    pub fn detach(&mut self, id: PolicyId) -> Result<(), PolicyError> {
        match self.nodes.get_mut(id.index()) {
            Some(PolicyNode::Dynamic(node)) => {
                node.attached = false;
                Ok(())
            }
            _ => Err(PolicyError::NotDynamic(id)),
        }
    }

    #[must_use]
    pub fn is_attached(&self, id: PolicyId) -> bool {
        matches!(
            self.node(id),
            PolicyNode::Dynamic(DynamicNode { attached: true, .. })
        )
    }

    pub(crate) fn refresh_inner(&self, id: PolicyId, topology: &Topology) -> Option<PolicyId> {
        match self.node(id) {
            PolicyNode::Dynamic(node) => node.refresh.as_ref().and_then(|f| f(topology)),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
