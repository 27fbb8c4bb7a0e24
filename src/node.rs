// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

use crate::blobref::BlobRef;
use crate::user::{PermBits, UserId};

/// Action carried by a [`Permission`] node.
///
/// `Expel` and `Change` are admitted into [`crate::ot::OTHistory`] (their allow/deny bits are
/// folded into the permission map like any other `Permission`), but their further federation
/// consequences are left unspecified; this crate resolves that open question in `DESIGN.md` by
/// not inventing a revocation side channel for them.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermAction {
    Invite,
    Expel,
    Change,
}

/// Attributes shared by every node kind: `blobref`, `signer`, `time`, and `parent`.
///
/// `parent` is empty for a `PermaNode` itself (it is its own root) and holds the owning
/// `PermaNode`'s `BlobRef` for every other kind.
#[derive(Clone, Debug)]
pub struct NodeHeader {
    pub blobref: BlobRef,
    pub signer: UserId,
    pub time: DateTime<Utc>,
    pub parent: BlobRef,
}

#[derive(Clone, Debug)]
pub struct MutationData {
    pub operation: serde_json::Value,
    pub site: String,
    pub dependencies: Vec<BlobRef>,
}

#[derive(Clone, Debug)]
pub struct PermissionData {
    pub user: UserId,
    pub allow: PermBits,
    pub deny: PermBits,
    pub action: PermAction,
    pub dependencies: Vec<BlobRef>,
}

#[derive(Clone, Debug)]
pub struct KeepData {
    /// The invitation `Permission` blobref this keep accepts, empty for the owner's self-keep.
    pub permission: BlobRef,
    pub dependencies: Vec<BlobRef>,
}

/// A perma-node's document-scoped membership and history state.
///
/// Kept out of [`NodeKind::PermaNode`]'s own struct body so that `Node` stays cheap to pass
/// around by value when only the header is needed; the indexer always reaches `PermaState`
/// through [`crate::indexer::Indexer`]'s node table, never by cloning it out of a `Node`.
#[derive(Clone, Debug, Default)]
pub struct PermaState {
    /// `userid -> accepting keep blobref`.
    pub keeps: indexmap::IndexMap<UserId, BlobRef>,
    /// `userid -> inviting permission blobref`, cleared on keep.
    pub pending_invitations: indexmap::IndexMap<UserId, BlobRef>,
    pub ot: crate::ot::OTHistory,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    PermaNode(PermaState),
    Mutation(MutationData),
    Permission(PermissionData),
    Keep(KeepData),
}

/// A single indexed blob: common header plus its kind-specific payload.
///
/// Node kinds share no inheritance hierarchy; `NodeKind` is a tagged sum type and `Node` pairs it
/// with the common [`NodeHeader`]. Nodes hold no references
/// to other nodes — every relationship is a [`BlobRef`] looked up through the indexer's node
/// table.
#[derive(Clone, Debug)]
pub struct Node {
    pub header: NodeHeader,
    pub kind: NodeKind,
}

impl Node {
    pub fn blobref(&self) -> &BlobRef { &self.header.blobref }

    pub fn signer(&self) -> &UserId { &self.header.signer }

    pub fn parent(&self) -> &BlobRef { &self.header.parent }

    pub fn time(&self) -> DateTime<Utc> { self.header.time }

    /// Dependencies declared by the blob, if its kind carries any (`PermaNode` does not).
    pub fn dependencies(&self) -> &[BlobRef] {
        match &self.kind {
            NodeKind::PermaNode(_) => &[],
            NodeKind::Mutation(m) => &m.dependencies,
            NodeKind::Permission(p) => &p.dependencies,
            NodeKind::Keep(k) => &k.dependencies,
        }
    }

    pub fn is_permanode(&self) -> bool { matches!(self.kind, NodeKind::PermaNode(_)) }

    pub fn as_permanode(&self) -> Option<&PermaState> {
        match &self.kind {
            NodeKind::PermaNode(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_permanode_mut(&mut self) -> Option<&mut PermaState> {
        match &mut self.kind {
            NodeKind::PermaNode(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_permission(&self) -> Option<&PermissionData> {
        match &self.kind {
            NodeKind::Permission(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_keep(&self) -> Option<&KeepData> {
        match &self.kind {
            NodeKind::Keep(k) => Some(k),
            _ => None,
        }
    }
}
