// SPDX-License-Identifier: Apache-2.0

//! OT History: per-`PermaNode` ordered sequence of OT-transformed nodes, with a frontier and a
//! folded permission map.
//!
//! The classical-OT transform algorithms themselves are out of scope for the Indexer Core:
//! [`OtTransformer`] is the seam a document-schema-specific transform library plugs into, the same
//! way [`crate::store::BlobStore`] and [`crate::federation::Federation`] are injected
//! collaborators rather than code this crate owns.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::blobref::BlobRef;
use crate::node::PermAction;
use crate::user::{PermBits, UserId};

/// External collaborator performing the actual OT transform math.
///
/// Default methods are identity/no-op placeholders: a real deployment supplies a transformer
/// matching its document schema (e.g. a text CRDT/OT library for `Mutation` operations). The
/// Indexer Core only needs to know *when* to call transform, not *how* — that is this trait's
/// job.
pub trait OtTransformer: Send + Sync {
    /// Mutation×Mutation (classical OT): rebase two concurrent operations against each other.
    fn transform_mutations(
        &self,
        a: &serde_json::Value,
        b: &serde_json::Value,
    ) -> (serde_json::Value, serde_json::Value) {
        (a.clone(), b.clone())
    }

    /// Permission×Permission: resolve two concurrent allow/deny bit-sets.
    fn transform_permissions(
        &self,
        a: (PermBits, PermBits),
        b: (PermBits, PermBits),
    ) -> ((PermBits, PermBits), (PermBits, PermBits)) {
        (a, b)
    }

    /// Inverts a mutation operation, for re-basing survivors when an ancestor is pruned.
    fn invert_mutation(&self, op: &serde_json::Value) -> serde_json::Value { op.clone() }

    /// Composes two mutation operations applied in sequence, for the same pruning re-base.
    fn compose_mutations(&self, _undo: &serde_json::Value, op: &serde_json::Value) -> serde_json::Value {
        op.clone()
    }

    /// `PrunePermission`: re-bases a surviving permission's bits after a concurrent one is pruned.
    fn prune_permission(
        &self,
        surviving: (PermBits, PermBits),
        _pruned: (PermBits, PermBits),
    ) -> (PermBits, PermBits) {
        surviving
    }
}

/// Default transformer: every operation passes through unchanged. Suitable only when the
/// embedding application supplies no concurrent edits to the same perma-node, or for tests that
/// don't exercise transform conflicts.
#[derive(Default)]
pub struct IdentityTransformer;

impl OtTransformer for IdentityTransformer {}

#[derive(Clone, Debug)]
pub enum HistoryPayload {
    Mutation { operation: serde_json::Value, site: String },
    Permission { user: UserId, allow: PermBits, deny: PermBits, action: PermAction },
    Keep { permission: BlobRef },
}

impl HistoryPayload {
    pub fn is_keep(&self) -> bool { matches!(self, HistoryPayload::Keep { .. }) }
}

#[derive(Clone, Debug)]
struct HistoryEntry {
    signer: UserId,
    dependencies: Vec<BlobRef>,
    payload: HistoryPayload,
}

/// A view onto one applied OT node, yielded by [`OTHistory::history`].
#[derive(Copy, Clone, Debug)]
pub struct HistoryItem<'a> {
    pub blobref: &'a BlobRef,
    pub signer: &'a UserId,
    pub dependencies: &'a [BlobRef],
    pub payload: &'a HistoryPayload,
}

/// Per-`PermaNode` OT-transformed history, frontier, and permission map.
#[derive(Clone)]
pub struct OTHistory {
    entries: IndexMap<BlobRef, HistoryEntry>,
    frontier: IndexSet<BlobRef>,
    permissions: IndexMap<UserId, PermBits>,
    transformer: Arc<dyn OtTransformer>,
}

impl fmt::Debug for OTHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OTHistory")
            .field("len", &self.entries.len())
            .field("frontier", &self.frontier)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl Default for OTHistory {
    fn default() -> Self { Self::new(Arc::new(IdentityTransformer)) }
}

impl OTHistory {
    pub fn new(transformer: Arc<dyn OtTransformer>) -> Self {
        Self { entries: IndexMap::new(), frontier: IndexSet::new(), permissions: IndexMap::new(), transformer }
    }

    /// Integrates an incoming OT-eligible node.
    ///
    /// Returns the still-missing dependency blobrefs if `dependencies` is not fully present in the
    /// history yet; the caller (`Indexer::handle_blob`) enqueues on them. Otherwise the node is
    /// transformed against every history node concurrent with it (those whose blobref is not in
    /// `dependencies`) and appended.
    pub fn apply(
        &mut self,
        blobref: BlobRef,
        signer: UserId,
        dependencies: Vec<BlobRef>,
        payload: HistoryPayload,
    ) -> Result<(), Vec<BlobRef>> {
        let missing: Vec<BlobRef> = dependencies
            .iter()
            .filter(|d| !d.is_empty() && !self.entries.contains_key(*d))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        self.integrate(blobref, signer, dependencies, payload);
        Ok(())
    }

    fn integrate(&mut self, blobref: BlobRef, signer: UserId, dependencies: Vec<BlobRef>, mut payload: HistoryPayload) {
        let dep_set: IndexSet<&BlobRef> = dependencies.iter().collect();
        let concurrent: Vec<BlobRef> = self
            .entries
            .keys()
            .filter(|k| !dep_set.contains(k))
            .cloned()
            .collect();
        for k in concurrent {
            let entry = self.entries.get_mut(&k).expect("key came from entries.keys()");
            transform(self.transformer.as_ref(), &mut entry.payload, &mut payload);
        }

        if let HistoryPayload::Permission { user, allow, deny, .. } = &payload {
            let current = self.permissions.get(user).copied().unwrap_or(PermBits::NONE);
            self.permissions.insert(user.clone(), current.union(*allow).difference(*deny));
        }

        for dep in &dependencies {
            self.frontier.shift_remove(dep);
        }
        self.frontier.insert(blobref.clone());
        self.entries.insert(blobref, HistoryEntry { signer, dependencies, payload });
    }

    pub fn frontier(&self) -> &IndexSet<BlobRef> { &self.frontier }

    /// Whether `user` holds every bit in `mask`, with `owner` implicitly granted all bits
    /// regardless of what is recorded in the permission map.
    pub fn has_permission(&self, owner: &UserId, user: &UserId, mask: PermBits) -> bool {
        if user == owner {
            return true;
        }
        self.permissions
            .get(user)
            .copied()
            .unwrap_or(PermBits::NONE)
            .contains(mask)
    }

    pub fn permission_bits(&self, user: &UserId) -> PermBits {
        self.permissions.get(user).copied().unwrap_or(PermBits::NONE)
    }

    /// All users holding every bit in `mask`, `owner` included unconditionally.
    pub fn users_with_permission(&self, owner: &UserId, mask: PermBits) -> Vec<UserId> {
        let mut out: Vec<UserId> = self
            .permissions
            .iter()
            .filter(|(_, bits)| bits.contains(mask))
            .map(|(u, _)| u.clone())
            .collect();
        if !out.contains(owner) {
            out.push(owner.clone());
        }
        out
    }

    /// Lazily yields every applied OT-node in causal (or reverse-causal) order.
    pub fn history(&self, reverse: bool) -> Box<dyn DoubleEndedIterator<Item = HistoryItem<'_>> + '_> {
        let iter = self.entries.iter().map(|(blobref, entry)| HistoryItem {
            blobref,
            signer: &entry.signer,
            dependencies: &entry.dependencies,
            payload: &entry.payload,
        });
        if reverse {
            Box::new(iter.rev())
        } else {
            Box::new(iter)
        }
    }

    pub fn contains(&self, blobref: &BlobRef) -> bool { self.entries.contains_key(blobref) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Ancestor closure of `frontier` within this history, following `dependencies` edges
    /// backward. Inclusive of the frontier blobrefs themselves.
    fn ancestor_closure(&self, frontier: &IndexSet<BlobRef>) -> IndexSet<BlobRef> {
        let mut closure = IndexSet::new();
        let mut stack: Vec<BlobRef> = frontier.iter().cloned().collect();
        while let Some(b) = stack.pop() {
            if !closure.insert(b.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get(&b) {
                for dep in &entry.dependencies {
                    if !dep.is_empty() && !closure.contains(dep) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        closure
    }

    /// Frontier-delta forwarding set: the historical blobs `local_user` must send to a follower
    /// whose stated OT frontier is `remote_frontier`, so that the follower catches up without
    /// re-downloading blobs it already has.
    ///
    /// Only blobs `local_user` is the source or attestor of are selected: a `Mutation`/
    /// `Permission` authored by `local_user`, or a `Keep` whose cited `permission` was signed by
    /// `local_user`. Peer-to-peer transit of third-party-signed blobs is that party's own
    /// responsibility — this keeps forwarding authoritative-per-signer.
    pub fn frontier_delta(&self, remote_frontier: &IndexSet<BlobRef>, local_user: &UserId) -> Vec<BlobRef> {
        let remote_ancestors = self.ancestor_closure(remote_frontier);
        let mut remaining: IndexSet<BlobRef> = remote_frontier.clone();
        let mut forwards = Vec::new();

        for item in self.history(true) {
            remaining.shift_remove(item.blobref);
            if !remote_ancestors.contains(item.blobref) {
                let eligible = item.signer == local_user
                    || match item.payload {
                        HistoryPayload::Keep { permission } => self
                            .entries
                            .get(permission)
                            .is_some_and(|p| &p.signer == local_user),
                        _ => false,
                    };
                if eligible {
                    forwards.push(item.blobref.clone());
                }
            }
            if remaining.is_empty() {
                break;
            }
        }
        forwards
    }

    /// Produces a history with `prune_set` removed, re-basing surviving `Mutation`/`Permission`
    /// nodes against anything pruned they directly depended on.
    ///
    /// Not exercised by the steady-state pipeline; exposed for recovery tooling and tests.
    pub fn prune(&self, prune_set: &IndexSet<BlobRef>) -> OTHistory {
        let mut out = OTHistory::new(self.transformer.clone());
        for (blobref, entry) in &self.entries {
            if prune_set.contains(blobref) {
                continue;
            }
            let mut payload = entry.payload.clone();
            for dep in &entry.dependencies {
                if prune_set.contains(dep) {
                    if let Some(pruned_entry) = self.entries.get(dep) {
                        payload = rebase_against_pruned(out.transformer.as_ref(), payload, &pruned_entry.payload);
                    }
                }
            }
            let deps: Vec<BlobRef> = entry
                .dependencies
                .iter()
                .filter(|d| !prune_set.contains(*d))
                .cloned()
                .collect();
            out.integrate(blobref.clone(), entry.signer.clone(), deps, payload);
        }
        out
    }
}

/// `transform(n1, n2)`: pairwise transform by kind.
///
/// Mutation×Mutation and Permission×Permission defer to the injected [`OtTransformer`]; every
/// other combination (Mutation×Permission, Mutation×Keep, Permission×Keep, Keep×Keep) is
/// identity — Keeps are order-only markers and never need transformation.
fn transform(t: &dyn OtTransformer, a: &mut HistoryPayload, b: &mut HistoryPayload) {
    match (a, b) {
        (HistoryPayload::Mutation { operation: oa, .. }, HistoryPayload::Mutation { operation: ob, .. }) => {
            let (na, nb) = t.transform_mutations(oa, ob);
            *oa = na;
            *ob = nb;
        }
        (
            HistoryPayload::Permission { allow: aa, deny: da, .. },
            HistoryPayload::Permission { allow: ab, deny: db, .. },
        ) => {
            let ((na, nd), (nb, ndb)) = t.transform_permissions((*aa, *da), (*ab, *db));
            *aa = na;
            *da = nd;
            *ab = nb;
            *db = ndb;
        }
        _ => {}
    }
}

fn rebase_against_pruned(t: &dyn OtTransformer, payload: HistoryPayload, pruned: &HistoryPayload) -> HistoryPayload {
    match (payload, pruned) {
        (
            HistoryPayload::Mutation { operation, site },
            HistoryPayload::Mutation { operation: pruned_op, .. },
        ) => {
            let undo = t.invert_mutation(pruned_op);
            let composed = t.compose_mutations(&undo, &operation);
            HistoryPayload::Mutation { operation: composed, site }
        }
        (
            HistoryPayload::Permission { user, allow, deny, action },
            HistoryPayload::Permission { allow: pa, deny: pd, .. },
        ) => {
            let (allow, deny) = t.prune_permission((allow, deny), (*pa, *pd));
            HistoryPayload::Permission { user, allow, deny, action }
        }
        (other, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn br(s: &str) -> BlobRef { BlobRef::new(s) }
    fn user(s: &str) -> UserId { UserId::new(s) }

    fn mutation(site: &str) -> HistoryPayload {
        HistoryPayload::Mutation { operation: serde_json::json!({"op": "insert"}), site: site.to_string() }
    }

    #[test]
    fn applies_linear_chain_and_advances_frontier() {
        let mut h = OTHistory::default();
        h.apply(br("m1"), user("a@b"), vec![], mutation("s1")).unwrap();
        h.apply(br("m2"), user("a@b"), vec![br("m1")], mutation("s1")).unwrap();
        assert_eq!(h.frontier().iter().collect::<Vec<_>>(), vec![&br("m2")]);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn apply_with_missing_dependency_returns_missing() {
        let mut h = OTHistory::default();
        let err = h.apply(br("m2"), user("a@b"), vec![br("m1")], mutation("s1")).unwrap_err();
        assert_eq!(err, vec![br("m1")]);
    }

    #[test]
    fn permission_fold_matches_invariant_i6() {
        let mut h = OTHistory::default();
        h.apply(
            br("p1"),
            user("owner@x"),
            vec![],
            HistoryPayload::Permission {
                user: user("u@x"),
                allow: PermBits::READ,
                deny: PermBits::NONE,
                action: PermAction::Invite,
            },
        )
        .unwrap();
        h.apply(
            br("p2"),
            user("owner@x"),
            vec![br("p1")],
            HistoryPayload::Permission {
                user: user("u@x"),
                allow: PermBits::WRITE,
                deny: PermBits::READ,
                action: PermAction::Change,
            },
        )
        .unwrap();

        let owner = user("owner@x");
        assert!(!h.has_permission(&owner, &user("u@x"), PermBits::READ));
        assert!(h.has_permission(&owner, &user("u@x"), PermBits::WRITE));
        assert!(h.has_permission(&owner, &owner, PermBits::READ | PermBits::EXPEL));
    }

    #[test]
    fn frontier_delta_forwards_only_local_signed_blobs_not_known_to_remote() {
        let mut h = OTHistory::default();
        let local = user("a@b");
        h.apply(br("m1"), local.clone(), vec![], mutation("s1")).unwrap();
        h.apply(br("m2"), local.clone(), vec![br("m1")], mutation("s1")).unwrap();
        h.apply(br("m3"), user("other@x"), vec![br("m2")], mutation("s2")).unwrap();

        // Remote has nothing yet.
        let empty = IndexSet::new();
        let mut delta = h.frontier_delta(&empty, &local);
        delta.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(delta, vec![br("m1"), br("m2")]);

        // Remote already has m1; only m2 remains, m3 is excluded (signed by someone else).
        let mut has_m1 = IndexSet::new();
        has_m1.insert(br("m1"));
        let delta2 = h.frontier_delta(&has_m1, &local);
        assert_eq!(delta2, vec![br("m2")]);
    }
}
