// SPDX-License-Identifier: Apache-2.0

//! In-memory [`BlobStore`] and fan-out test harness for the indexer core.
//!
//! Content addressing is not itself in scope for the indexer core, which treats `BlobRef` as
//! opaque, but a usable store still has to assign *some* identifier when content is handed to it
//! without one; this implementation hashes with `blake3`, mirroring how the pack's other
//! persistence backends (`fsmem`, `persistence/fs`) are thin, swappable adapters around the core
//! traits rather than part of the core itself.

#[macro_use]
extern crate amplify;

use std::collections::HashMap;

use weave_index::{BlobRef, BlobStore};

/// An in-memory, process-local [`BlobStore`]. Suitable for tests and single-process embedding;
/// not durable across restarts.
#[derive(Debug, Default)]
pub struct MemStore {
    blobs: HashMap<BlobRef, (String, Vec<u8>)>,
}

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum MemStoreError {
    /// blob '{0}' was never stored
    NotFound(BlobRef),
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    /// Hashes `bytes` with blake3 and stores them under the resulting [`BlobRef`], tagged with
    /// `mimetype`. Returns the assigned ref.
    pub fn put(&mut self, mimetype: impl Into<String>, bytes: impl Into<Vec<u8>>) -> BlobRef {
        let bytes = bytes.into();
        let blobref = BlobRef::new(blake3::hash(&bytes).to_hex().to_string());
        self.blobs.insert(blobref.clone(), (mimetype.into(), bytes));
        blobref
    }
}

impl BlobStore for MemStore {
    type Error = MemStoreError;

    fn store_blob(&mut self, blobref: &BlobRef, bytes: &[u8]) -> Result<(), Self::Error> {
        self.blobs
            .entry(blobref.clone())
            .or_insert_with(|| (weave_index::envelope::SCHEMA_MIMETYPE.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn get_blob(&self, blobref: &BlobRef) -> Result<Vec<u8>, Self::Error> {
        self.blobs
            .get(blobref)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| MemStoreError::NotFound(blobref.clone()))
    }

    fn mimetype(&self, blobref: &BlobRef) -> Result<String, Self::Error> {
        self.blobs
            .get(blobref)
            .map(|(mime, _)| mime.clone())
            .ok_or_else(|| MemStoreError::NotFound(blobref.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = MemStore::new();
        let blobref = store.put("application/x-lightwave-schema", b"{}".to_vec());
        assert_eq!(store.get_blob(&blobref).unwrap(), b"{}");
        assert_eq!(store.mimetype(&blobref).unwrap(), "application/x-lightwave-schema");
    }

    #[test]
    fn unknown_blobref_is_an_error() {
        let store = MemStore::new();
        let err = store.get_blob(&BlobRef::new("missing")).unwrap_err();
        assert!(matches!(err, MemStoreError::NotFound(_)));
    }
}
