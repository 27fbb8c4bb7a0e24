// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Content-hash identifier of an immutable blob.
///
/// `BlobRef` is opaque to the indexer: equality is plain string equality, and
/// no assumption is made about the hash function that produced it — that is
/// the blob store's concern (see [`crate::store::BlobStore`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<String> for BlobRef {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for BlobRef {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl std::borrow::Borrow<str> for BlobRef {
    fn borrow(&self) -> &str { &self.0 }
}
