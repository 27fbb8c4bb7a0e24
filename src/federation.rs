// SPDX-License-Identifier: Apache-2.0

//! Federation Dispatcher contract: decides which peers receive which blobs. The actual network
//! transport is out of scope; this crate only specifies the trait boundary and a
//! [`NullFederation`] no-op for offline/single-user embedders.

use crate::blobref::BlobRef;
use crate::user::UserId;

/// Peer-forwarding capability injected into [`crate::indexer::Indexer`].
///
/// Calls are fire-and-forget from the core's point of view: `handle_blob` never awaits their
/// result, and a `Federation` implementation's own errors never abort indexing.
pub trait Federation {
    type Error: std::error::Error;

    /// Forwards `blobref` to every user in `users`. Delivery order to peers is not guaranteed by
    /// the core; only application order per local action is.
    fn forward(&mut self, blobref: &BlobRef, users: &[UserId]) -> Result<(), Self::Error>;

    /// Asynchronously pre-fetches a remote perma-node's history reachable from `permission`, as a
    /// side effect of accepting a keep. The Indexer Core does not await this and does not depend
    /// on it completing for correctness — the Dependency Queue handles eventual arrival of
    /// whatever it downloads.
    fn download_perma_node(&mut self, permission: &BlobRef) -> Result<(), Self::Error>;
}

/// No-op [`Federation`] for callers that run single-user/offline.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullFederation;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("null federation never fails")]
pub struct NeverFails;

impl Federation for NullFederation {
    type Error = NeverFails;

    fn forward(&mut self, _blobref: &BlobRef, _users: &[UserId]) -> Result<(), Self::Error> { Ok(()) }

    fn download_perma_node(&mut self, _permission: &BlobRef) -> Result<(), Self::Error> { Ok(()) }
}
