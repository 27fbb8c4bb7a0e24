// SPDX-License-Identifier: Apache-2.0

//! Blob store contract consumed by the Indexer Core.
//!
//! The store itself — durability, content-hashing, signature verification — is out of scope;
//! this crate only specifies the trait boundary, the same way `hypersonic` injects its `Stock`
//! persistence trait rather than owning a storage backend.

use crate::blobref::BlobRef;

/// Append-only, random-access-read blob sink.
///
/// # Blocking I/O
///
/// `get_blob` is called synchronously from inside [`crate::indexer::Indexer::handle_blob`]'s
/// waiter-release recursion: the core re-fetches rather than retaining bytes, to keep the queue
/// O(refs) not O(bytes). Implementations MAY block.
pub trait BlobStore {
    type Error: std::error::Error;

    /// Stores `bytes` under `blobref`. Idempotent: storing the same blobref twice with identical
    /// bytes is a no-op from the caller's perspective.
    fn store_blob(&mut self, blobref: &BlobRef, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Retrieves previously-stored bytes.
    ///
    /// # Panics
    ///
    /// Implementations SHOULD return an error rather than panic for an unknown `blobref`; the
    /// Indexer Core only calls this for blobrefs it has already observed via a listener or a
    /// dependency reference, so a missing blob here indicates a store inconsistency.
    fn get_blob(&self, blobref: &BlobRef) -> Result<Vec<u8>, Self::Error>;

    /// Mimetype of a stored blob, used by the Blob Classifier to decide whether to even attempt
    /// parsing it as a schema envelope.
    fn mimetype(&self, blobref: &BlobRef) -> Result<String, Self::Error>;
}
