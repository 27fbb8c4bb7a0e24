// SPDX-License-Identifier: Apache-2.0

//! Main pipeline tying together the Blob Classifier, Dependency Queue, OT History, and
//! Permission/Keep state machine.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::blobref::BlobRef;
use crate::config::IndexerConfig;
use crate::envelope::{classify, Classification};
use crate::events::{Event, Listener};
use crate::federation::Federation;
use crate::node::{KeepData, Node, NodeKind, PermAction};
use crate::ot::{HistoryPayload, IdentityTransformer, OtTransformer};
use crate::queue::DependencyQueue;
use crate::store::BlobStore;
use crate::user::{PermBits, UserId};

/// Result of a single [`Indexer::handle_blob`] call.
///
/// A blob waiting on a dependency is not an error condition; it is the `Enqueued` variant here.
#[derive(Clone, Debug)]
pub enum HandleOutcome {
    /// Blob's mimetype was not the schema mimetype; it passed through unindexed.
    Ignored,
    /// Blob failed validation or a cross-reference check; recorded as `processed = false`.
    Rejected { blobref: BlobRef, reason: String },
    /// Blob is missing one or more dependencies; recorded in the Dependency Queue.
    Enqueued { blobref: BlobRef, waiting_on: Vec<BlobRef> },
    /// Blob was successfully indexed.
    Applied { blobref: BlobRef },
}

/// Infrastructure failures surfaced from the injected [`BlobStore`]/[`Federation`] collaborators.
///
/// Malformed blobs, bad cross-references, and policy violations are logged and folded into
/// `Ok(HandleOutcome::Rejected)` instead of an `Err` here — this type only carries conditions a
/// correctly-wired caller isn't expected to hit in the course of normal protocol handling.
#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum HandleError {
    /// blob store operation failed: {0}
    Store(String),
    /// federation dispatch failed: {0}
    Federation(String),
}

enum CheckKeepOutcome {
    Accept,
    Enqueue(Vec<BlobRef>),
    Reject(String),
}

/// The Indexer Core: consumes blobs in arbitrary arrival order and reconstructs, per document, a
/// consistent causal graph with OT applied and permission state maintained.
///
/// # Concurrency
///
/// Single-threaded cooperative: `handle_blob` is reentrant via recursion through the waiter-release
/// loop, but the type is not thread-safe — callers must serialize calls.
pub struct Indexer<S: BlobStore, F: Federation> {
    store: S,
    federation: F,
    listeners: Vec<Box<dyn Listener>>,
    user_id: UserId,
    transformer: Arc<dyn OtTransformer>,

    nodes: IndexMap<BlobRef, Node>,
    blobs: IndexMap<BlobRef, bool>,
    queue: DependencyQueue,
    open_invitations: IndexMap<BlobRef, BlobRef>,
}

impl<S: BlobStore, F: Federation> Indexer<S, F> {
    pub fn new(config: IndexerConfig, store: S, federation: F) -> Self {
        Self::with_transformer(config, store, federation, Arc::new(IdentityTransformer))
    }

    pub fn with_transformer(
        config: IndexerConfig,
        store: S,
        federation: F,
        transformer: Arc<dyn OtTransformer>,
    ) -> Self {
        Self {
            store,
            federation,
            listeners: Vec::new(),
            user_id: config.user_id,
            transformer,
            nodes: IndexMap::new(),
            blobs: IndexMap::new(),
            queue: DependencyQueue::new(),
            open_invitations: IndexMap::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) { self.listeners.push(listener); }

    pub fn user_id(&self) -> &UserId { &self.user_id }

    pub fn store(&self) -> &S { &self.store }

    pub fn node(&self, blobref: &BlobRef) -> Option<&Node> { self.nodes.get(blobref) }

    /// `true` once-applied, `false` once-rejected, `None` if never seen.
    pub fn is_processed(&self, blobref: &BlobRef) -> Option<bool> { self.blobs.get(blobref).copied() }

    pub fn open_invitations(&self) -> impl Iterator<Item = (&BlobRef, &BlobRef)> { self.open_invitations.iter() }

    /// Waiters with no hope of release because an ancestor was rejected.
    pub fn stranded_waiters(&self) -> impl Iterator<Item = &BlobRef> { self.queue.stranded() }

    fn emit(&mut self, event: Event) {
        for listener in &mut self.listeners {
            listener.on_event(event.clone());
        }
    }

    fn all_deps_present(&self, deps: &[BlobRef]) -> bool {
        deps.iter().all(|d| d.is_empty() || self.nodes.contains_key(d))
    }

    /// Drives the Indexer Core with one newly-stored blob.
    pub fn handle_blob(&mut self, blobref: BlobRef, bytes: &[u8]) -> Result<HandleOutcome, HandleError> {
        if let Some(&processed) = self.blobs.get(&blobref) {
            return Ok(if processed {
                HandleOutcome::Applied { blobref }
            } else {
                HandleOutcome::Rejected { blobref, reason: "blob was previously rejected".into() }
            });
        }

        let mimetype = self
            .store
            .mimetype(&blobref)
            .map_err(|e| HandleError::Store(e.to_string()))?;

        let node = match classify(&mimetype, bytes, &blobref) {
            Classification::Ignored => return Ok(HandleOutcome::Ignored),
            Classification::Rejected(e) => {
                tracing::warn!(%blobref, error = %e, "rejecting malformed blob");
                self.blobs.insert(blobref.clone(), false);
                return Ok(HandleOutcome::Rejected { blobref, reason: e.to_string() });
            }
            Classification::Node(node) => node,
        };

        // Step 2: resolve parent.
        if !node.parent().is_empty() {
            if !self.nodes.contains_key(node.parent()) {
                let deps = vec![node.parent().clone()];
                tracing::trace!(%blobref, parent = %node.parent(), "enqueued: waiting on parent permanode");
                self.queue.enqueue(blobref.clone(), deps.clone());
                return Ok(HandleOutcome::Enqueued { blobref, waiting_on: deps });
            }
            if self.nodes[node.parent()].as_permanode().is_none() {
                tracing::warn!(%blobref, parent = %node.parent(), "rejecting: parent is not a permanode");
                self.blobs.insert(blobref.clone(), false);
                return Ok(HandleOutcome::Rejected {
                    blobref,
                    reason: "parent is not a PermaNode".into(),
                });
            }
        }

        // Step 3: kind dispatch.
        if node.is_permanode() {
            let blobref = node.blobref().clone();
            let mut node = node;
            if let Some(state) = node.as_permanode_mut() {
                state.ot = crate::ot::OTHistory::new(self.transformer.clone());
            }
            self.insert_applied(node);
            self.finish(&blobref)?;
            return Ok(HandleOutcome::Applied { blobref });
        }

        let is_early_invitation = match &node.kind {
            NodeKind::Permission(perm) => {
                perm.action == PermAction::Invite
                    && perm.user == self.user_id
                    && !self.all_deps_present(&perm.dependencies)
            }
            _ => false,
        };
        if is_early_invitation {
            let blobref = node.blobref().clone();
            let perma = node.parent().clone();
            let deps: Vec<BlobRef> = node
                .dependencies()
                .iter()
                .filter(|d| !d.is_empty() && !self.nodes.contains_key(*d))
                .cloned()
                .collect();
            self.emit(Event::Invitation { perma: perma.clone(), invitation: blobref.clone() });
            self.open_invitations.insert(perma, blobref.clone());
            tracing::debug!(%blobref, "raised invitation event ahead of dependency arrival");
            self.queue.enqueue(blobref.clone(), deps.clone());
            return Ok(HandleOutcome::Enqueued { blobref, waiting_on: deps });
        }

        if let NodeKind::Keep(keep) = &node.kind {
            let keep = keep.clone();
            let blobref = node.blobref().clone();
            let perma_ref = node.parent().clone();
            let keep_signer = node.signer().clone();
            match self.check_keep(&perma_ref, &keep_signer, &blobref, &keep)? {
                CheckKeepOutcome::Reject(reason) => {
                    tracing::warn!(%blobref, %reason, "rejecting keep");
                    self.blobs.insert(blobref.clone(), false);
                    return Ok(HandleOutcome::Rejected { blobref, reason });
                }
                CheckKeepOutcome::Enqueue(deps) => {
                    self.queue.enqueue(blobref.clone(), deps.clone());
                    return Ok(HandleOutcome::Enqueued { blobref, waiting_on: deps });
                }
                CheckKeepOutcome::Accept => {}
            }
        }

        self.apply_ot(node)
    }

    fn insert_applied(&mut self, node: Node) {
        let blobref = node.blobref().clone();
        self.nodes.insert(blobref.clone(), node);
        self.blobs.insert(blobref, true);
    }

    fn apply_ot(&mut self, node: Node) -> Result<HandleOutcome, HandleError> {
        let blobref = node.blobref().clone();
        let perma_ref = node.parent().clone();
        let signer = node.signer().clone();
        let dependencies = node.dependencies().to_vec();
        let payload = to_history_payload(&node.kind);

        let perma = self
            .nodes
            .get_mut(&perma_ref)
            .and_then(Node::as_permanode_mut)
            .expect("parent presence and PermaNode-ness were already validated in handle_blob");

        if let Err(missing) = perma.ot.apply(blobref.clone(), signer, dependencies, payload) {
            tracing::trace!(%blobref, ?missing, "enqueued: waiting on OT dependencies");
            self.queue.enqueue(blobref.clone(), missing.clone());
            return Ok(HandleOutcome::Enqueued { blobref, waiting_on: missing });
        }

        let is_keep = matches!(node.kind, NodeKind::Keep(_));
        let is_permission = matches!(node.kind, NodeKind::Permission(_));
        self.insert_applied(node);

        if is_keep {
            self.handle_keep(&perma_ref, &blobref)?;
        } else if is_permission {
            self.handle_permission(&perma_ref, &blobref)?;
        } else {
            self.emit(Event::Mutation { perma: perma_ref.clone(), mutation: blobref.clone() });
        }

        self.finish(&blobref)?;
        Ok(HandleOutcome::Applied { blobref })
    }

    /// Validates a keep against its cited invitation before it is folded into the OT history.
    fn check_keep(
        &mut self,
        perma_ref: &BlobRef,
        keep_signer: &UserId,
        keep_blobref: &BlobRef,
        keep: &KeepData,
    ) -> Result<CheckKeepOutcome, HandleError> {
        let perma_signer = self.nodes[perma_ref].signer().clone();
        if *keep_signer == perma_signer {
            return Ok(CheckKeepOutcome::Accept);
        }

        if keep.permission.is_empty() {
            return Ok(CheckKeepOutcome::Reject(
                "non-owner keep is missing a permission reference".into(),
            ));
        }
        let Some(perm_node) = self.nodes.get(&keep.permission) else {
            return Ok(CheckKeepOutcome::Enqueue(vec![keep.permission.clone()]));
        };
        let Some(perm) = perm_node.as_permission() else {
            return Ok(CheckKeepOutcome::Reject("keep cites a non-Permission blob".into()));
        };
        if perm.user != *keep_signer {
            return Ok(CheckKeepOutcome::Reject(
                "keep signer does not match the cited permission's target user".into(),
            ));
        }

        if *keep_signer == self.user_id {
            if let Err(e) = self.federation.download_perma_node(&keep.permission) {
                tracing::warn!(%perma_ref, error = %e, "perma-node prefetch failed");
            }
            self.emit(Event::AcceptedInvitation {
                perma: perma_ref.clone(),
                invitation: keep.permission.clone(),
                keep: keep_blobref.clone(),
            });
        }
        Ok(CheckKeepOutcome::Accept)
    }

    /// Membership and federation side effects of a keep that has just been folded into history.
    fn handle_keep(&mut self, perma_ref: &BlobRef, keep_blobref: &BlobRef) -> Result<(), HandleError> {
        let keep_signer = self.nodes[keep_blobref].signer().clone();
        let keep_permission = self.nodes[keep_blobref]
            .as_keep()
            .expect("handle_keep only called for Keep nodes")
            .permission
            .clone();
        let perma_signer = self.nodes[perma_ref].signer().clone();

        {
            let perma = self
                .nodes
                .get_mut(perma_ref)
                .and_then(Node::as_permanode_mut)
                .expect("handle_keep only called with a valid PermaNode parent");
            perma.pending_invitations.shift_remove(&keep_signer);
            perma.keeps.insert(keep_signer.clone(), keep_blobref.clone());
        }

        if keep_signer == self.user_id && !keep_permission.is_empty() {
            // Local user accepting an invitation.
            if let Some(inviter) = self.nodes.get(&keep_permission).map(|n| n.signer().clone()) {
                self.federation
                    .forward(keep_blobref, std::slice::from_ref(&inviter))
                    .map_err(|e| HandleError::Federation(e.to_string()))?;
            }
            self.open_invitations.shift_remove(perma_ref);
            self.emit(Event::PermaNode {
                perma: perma_ref.clone(),
                invitation: Some(keep_permission),
                keep: keep_blobref.clone(),
            });
        } else if keep_signer != perma_signer {
            // Remote user accepting an invitation.
            self.emit(Event::NewFollower {
                perma: perma_ref.clone(),
                invitation: keep_permission,
                keep: keep_blobref.clone(),
                user: keep_signer.clone(),
            });

            let remote_frontier: IndexSet<BlobRef> =
                self.nodes[keep_blobref].dependencies().iter().cloned().collect();
            let forwards = {
                let perma = self.nodes[perma_ref].as_permanode().expect("validated above");
                perma.ot.frontier_delta(&remote_frontier, &self.user_id)
            };
            for forward in forwards {
                self.federation
                    .forward(&forward, std::slice::from_ref(&keep_signer))
                    .map_err(|e| HandleError::Federation(e.to_string()))?;
            }
        } else {
            // Self-keep by the perma's owner.
            self.emit(Event::PermaNode { perma: perma_ref.clone(), invitation: None, keep: keep_blobref.clone() });
        }
        Ok(())
    }

    /// Membership bookkeeping and federation side effects of a permission that has just been
    /// folded into history.
    fn handle_permission(&mut self, perma_ref: &BlobRef, perm_blobref: &BlobRef) -> Result<(), HandleError> {
        let perm = self.nodes[perm_blobref]
            .as_permission()
            .expect("handle_permission only called for Permission nodes")
            .clone();
        let perm_signer = self.nodes[perm_blobref].signer().clone();

        match perm.action {
            PermAction::Invite => {
                {
                    let perma = self
                        .nodes
                        .get_mut(perma_ref)
                        .and_then(Node::as_permanode_mut)
                        .expect("validated PermaNode parent");
                    perma.pending_invitations.insert(perm.user.clone(), perm_blobref.clone());
                }
                if perm.user == self.user_id {
                    self.open_invitations.insert(perma_ref.clone(), perm_blobref.clone());
                }
                if perm_signer == self.user_id {
                    self.federation
                        .forward(perm_blobref, std::slice::from_ref(&perm.user))
                        .map_err(|e| HandleError::Federation(e.to_string()))?;
                    self.federation
                        .forward(perma_ref, std::slice::from_ref(&perm.user))
                        .map_err(|e| HandleError::Federation(e.to_string()))?;
                }
            }
            // Folding allow/deny bits into `ot.permissions` already happened inside `apply_ot`'s
            // call to `OTHistory::apply`; further federation consequences (revoking forwards,
            // expelling keeps) are deliberately not invented here (see DESIGN.md).
            PermAction::Expel | PermAction::Change => {}
        }

        self.emit(Event::Permission { perma: perma_ref.clone(), action: perm.action, permission: perm_blobref.clone() });
        Ok(())
    }

    /// Federates the just-applied blob, then releases its waiters, in that fixed order — so
    /// peers see a causally-ordered stream rather than waiters arriving ahead of the blob that
    /// unblocked them.
    fn finish(&mut self, blobref: &BlobRef) -> Result<(), HandleError> {
        self.federate(blobref)?;
        self.release_waiters(blobref)
    }

    fn federate(&mut self, blobref: &BlobRef) -> Result<(), HandleError> {
        let node = &self.nodes[blobref];
        if node.signer() != &self.user_id {
            return Ok(());
        }
        let perma_ref = if node.is_permanode() { blobref.clone() } else { node.parent().clone() };
        let Some(perma_node) = self.nodes.get(&perma_ref) else { return Ok(()) };
        let owner = perma_node.signer().clone();
        let Some(perma) = perma_node.as_permanode() else { return Ok(()) };

        let followers: Vec<UserId> = perma
            .ot
            .users_with_permission(&owner, PermBits::READ)
            .into_iter()
            .filter(|u| u != &self.user_id)
            .collect();
        if followers.is_empty() {
            return Ok(());
        }
        self.federation
            .forward(blobref, &followers)
            .map_err(|e| HandleError::Federation(e.to_string()))
    }

    fn release_waiters(&mut self, blobref: &BlobRef) -> Result<(), HandleError> {
        for waiter in self.queue.dequeue(blobref) {
            let bytes = self
                .store
                .get_blob(&waiter)
                .map_err(|e| HandleError::Store(e.to_string()))?;
            self.handle_blob(waiter, &bytes)?;
        }
        Ok(())
    }
}

fn to_history_payload(kind: &NodeKind) -> HistoryPayload {
    match kind {
        NodeKind::Mutation(m) => HistoryPayload::Mutation { operation: m.operation.clone(), site: m.site.clone() },
        NodeKind::Permission(p) => {
            HistoryPayload::Permission { user: p.user.clone(), allow: p.allow, deny: p.deny, action: p.action }
        }
        NodeKind::Keep(k) => HistoryPayload::Keep { permission: k.permission.clone() },
        NodeKind::PermaNode(_) => unreachable!("PermaNode is not OT-eligible"),
    }
}

#[cfg(test)]
mod tests {
    use weave_store_mem::MemStore;

    use super::*;
    use crate::envelope::SCHEMA_MIMETYPE;
    use crate::events::RecordingListener;
    use crate::federation::NullFederation;

    fn indexer(user: &str) -> Indexer<MemStore, NullFederation> {
        Indexer::new(IndexerConfig::new(user), MemStore::new(), NullFederation)
    }

    fn store_permanode(idx: &mut Indexer<MemStore, NullFederation>, signer: &str) -> BlobRef {
        let json = serde_json::json!({
            "type": "permanode",
            "t": "2024-01-01T00:00:00Z",
            "signer": signer,
        });
        idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&json).unwrap())
    }

    fn store_mutation(
        idx: &mut Indexer<MemStore, NullFederation>,
        signer: &str,
        perma: &BlobRef,
        dep: &[&BlobRef],
    ) -> BlobRef {
        let json = serde_json::json!({
            "type": "mutation",
            "t": "2024-01-01T00:00:01Z",
            "signer": signer,
            "perma": perma.as_str(),
            "dep": dep.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            "op": {"insert": "hi"},
            "site": "s1",
        });
        idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&json).unwrap())
    }

    fn deliver(idx: &mut Indexer<MemStore, NullFederation>, blobref: &BlobRef) -> HandleOutcome {
        let bytes = idx.store.get_blob(blobref).unwrap();
        idx.handle_blob(blobref.clone(), &bytes).unwrap()
    }

    #[test]
    fn permanode_then_mutation_applies_in_order() {
        let mut idx = indexer("a@b");
        let perma = store_permanode(&mut idx, "a@b");
        assert!(matches!(deliver(&mut idx, &perma), HandleOutcome::Applied { .. }));

        let mutation = store_mutation(&mut idx, "a@b", &perma, &[]);
        assert!(matches!(deliver(&mut idx, &mutation), HandleOutcome::Applied { .. }));

        let perma_node = idx.node(&perma).unwrap().as_permanode().unwrap();
        assert_eq!(perma_node.ot.len(), 1);
        assert!(perma_node.ot.contains(&mutation));
    }

    #[test]
    fn mutation_before_parent_enqueues_then_releases_on_arrival() {
        let mut idx = indexer("a@b");
        let perma = store_permanode(&mut idx, "a@b");
        let mutation = store_mutation(&mut idx, "a@b", &perma, &[]);

        // Mutation arrives first: its parent permanode has not been handled yet.
        let outcome = deliver(&mut idx, &mutation);
        assert!(matches!(outcome, HandleOutcome::Enqueued { ref waiting_on, .. } if *waiting_on == vec![perma.clone()]));

        // Parent arrives: releasing the mutation happens as part of handling it.
        deliver(&mut idx, &perma);

        let perma_node = idx.node(&perma).unwrap().as_permanode().unwrap();
        assert!(perma_node.ot.contains(&mutation));
        assert_eq!(idx.is_processed(&mutation), Some(true));
    }

    #[test]
    fn owner_self_keep_emits_permanode_event() {
        let mut idx = indexer("a@b");
        idx.add_listener(Box::new(RecordingListener::default()));
        let perma = store_permanode(&mut idx, "a@b");
        deliver(&mut idx, &perma);

        let json = serde_json::json!({
            "type": "keep",
            "t": "2024-01-01T00:00:02Z",
            "signer": "a@b",
            "perma": perma.as_str(),
            "dep": [],
        });
        let keep = idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&json).unwrap());
        assert!(matches!(deliver(&mut idx, &keep), HandleOutcome::Applied { .. }));

        let perma_node = idx.node(&perma).unwrap().as_permanode().unwrap();
        assert_eq!(perma_node.keeps.get(&UserId::new("a@b")), Some(&keep));
    }

    #[test]
    fn invited_user_keep_citing_permission_accepts_and_folds_permission() {
        let mut owner_idx = indexer("a@b");
        let perma = store_permanode(&mut owner_idx, "a@b");
        deliver(&mut owner_idx, &perma);

        let perm_json = serde_json::json!({
            "type": "permission",
            "t": "2024-01-01T00:00:02Z",
            "signer": "a@b",
            "perma": perma.as_str(),
            "dep": [],
            "user": "c@d",
            "allow": PermBits::READ.bits(),
            "deny": 0,
            "action": "invite",
        });
        let permission = owner_idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&perm_json).unwrap());
        assert!(matches!(deliver(&mut owner_idx, &permission), HandleOutcome::Applied { .. }));
        assert_eq!(owner_idx.open_invitations().count(), 0, "invite target is not the local user");

        let keep_json = serde_json::json!({
            "type": "keep",
            "t": "2024-01-01T00:00:03Z",
            "signer": "c@d",
            "perma": perma.as_str(),
            "dep": [],
            "permission": permission.as_str(),
        });
        let keep = owner_idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&keep_json).unwrap());
        assert!(matches!(deliver(&mut owner_idx, &keep), HandleOutcome::Applied { .. }));

        let perma_node = owner_idx.node(&perma).unwrap().as_permanode().unwrap();
        assert!(perma_node.ot.has_permission(&UserId::new("a@b"), &UserId::new("c@d"), PermBits::READ));
        assert_eq!(perma_node.keeps.get(&UserId::new("c@d")), Some(&keep));
        assert!(!perma_node.pending_invitations.contains_key(&UserId::new("c@d")));
    }

    #[test]
    fn keep_citing_mismatched_user_is_rejected() {
        let mut owner_idx = indexer("a@b");
        let perma = store_permanode(&mut owner_idx, "a@b");
        deliver(&mut owner_idx, &perma);

        let perm_json = serde_json::json!({
            "type": "permission",
            "t": "2024-01-01T00:00:02Z",
            "signer": "a@b",
            "perma": perma.as_str(),
            "dep": [],
            "user": "c@d",
            "allow": PermBits::READ.bits(),
            "deny": 0,
            "action": "invite",
        });
        let permission = owner_idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&perm_json).unwrap());
        deliver(&mut owner_idx, &permission);

        let keep_json = serde_json::json!({
            "type": "keep",
            "t": "2024-01-01T00:00:03Z",
            "signer": "someone-else@x",
            "perma": perma.as_str(),
            "dep": [],
            "permission": permission.as_str(),
        });
        let keep = owner_idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&keep_json).unwrap());
        assert!(matches!(deliver(&mut owner_idx, &keep), HandleOutcome::Rejected { .. }));
        assert_eq!(owner_idx.is_processed(&keep), Some(false));
    }

    #[test]
    fn invite_to_local_user_enqueues_only_on_the_dependency_still_missing() {
        let mut idx = indexer("c@d");
        let perma = store_permanode(&mut idx, "a@b");
        deliver(&mut idx, &perma);

        let m1 = store_mutation(&mut idx, "a@b", &perma, &[]);
        deliver(&mut idx, &m1);

        // m2 is stored but never delivered, so it is the only dependency of the invite that is
        // actually still missing by the time the invite itself arrives.
        let m2 = store_mutation(&mut idx, "a@b", &perma, &[&m1]);

        let invite_json = serde_json::json!({
            "type": "permission",
            "t": "2024-01-01T00:00:02Z",
            "signer": "a@b",
            "perma": perma.as_str(),
            "dep": [m1.as_str(), m2.as_str()],
            "user": "c@d",
            "allow": PermBits::READ.bits(),
            "deny": 0,
            "action": "invite",
        });
        let invitation = idx.store.put(SCHEMA_MIMETYPE, serde_json::to_vec(&invite_json).unwrap());

        let outcome = deliver(&mut idx, &invitation);
        assert!(
            matches!(outcome, HandleOutcome::Enqueued { ref waiting_on, .. } if *waiting_on == vec![m2.clone()]),
            "invite must enqueue only on the dependency that is actually still missing, not on m1 \
             which is already applied and whose release has already fired"
        );

        // Delivering the missing dependency must release and fully apply the invitation, not
        // strand it forever waiting on a dependency release that already happened.
        assert!(matches!(deliver(&mut idx, &m2), HandleOutcome::Applied { .. }));
        assert_eq!(idx.is_processed(&invitation), Some(true));
        assert_eq!(idx.open_invitations().count(), 1);
    }
}
