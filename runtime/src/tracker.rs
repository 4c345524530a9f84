// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery and observer bookkeeping for mutable sub-policies.
//!
//! `find_dynamic` walks a policy tree and returns every dynamic node
//! reachable from the root, breaking cycles at recursion nodes by
//! identity. The runtime attaches its change observer to each of them at
//! startup and reconciles the attachment set whenever a dynamic node swaps
//! its inner policy.

use policy::{PolicyArena, PolicyClass, PolicyId};
use std::collections::HashSet;
use tracing::warn;

/// The set of mutable sub-policies reachable from `root`.
#[must_use]
pub fn find_dynamic(arena: &PolicyArena, root: PolicyId) -> HashSet<PolicyId> {
    let mut found = HashSet::new();
    let mut seen = HashSet::new();
    walk(arena, root, &mut found, &mut seen);
    found
}

fn walk(
    arena: &PolicyArena,
    id: PolicyId,
    found: &mut HashSet<PolicyId>,
    seen: &mut HashSet<PolicyId>,
) {
    match arena.class_of(id) {
        PolicyClass::Dynamic => {
            found.insert(id);
        }
        PolicyClass::Recurse => {
            // recursion nodes self-reference; stop by node identity
            if !seen.insert(id) {
                return;
            }
        }
        PolicyClass::Combinator | PolicyClass::Derived => {}
        _ => return,
    }
    for child in arena.children(id) {
        walk(arena, child, found, seen);
    }
}

/// Attach the runtime's change observer to every dynamic sub-policy.
/// Returns how many attachments were made.
pub fn attach_all(arena: &mut PolicyArena, root: PolicyId) -> usize {
    let dynamics = find_dynamic(arena, root);
    let count = dynamics.len();
    for id in dynamics {
        if let Err(e) = arena.attach(id) {
            warn!("failed to attach policy observer: {e}");
        }
    }
    count
}

/// Reconcile attachments after a dynamic node swapped `old` for `new`:
/// nodes reachable only from `old` are detached, nodes reachable only
/// from `new` are attached, nodes in both are untouched.
pub fn reconcile_attachments(arena: &mut PolicyArena, old: PolicyId, new: PolicyId) {
    let old_set = find_dynamic(arena, old);
    let new_set = find_dynamic(arena, new);
    for id in old_set.difference(&new_set) {
        if let Err(e) = arena.detach(*id) {
            warn!("failed to detach policy observer: {e}");
        }
    }
    for id in new_set.difference(&old_set) {
        if let Err(e) = arena.attach(*id) {
            warn!("failed to attach policy observer: {e}");
        }
    }
}
