// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Identifies a signer or invitee in the form `name@domain`.
///
/// `UserId` is a thin wrapper, not a validated address: the Blob Classifier (see
/// [`crate::envelope`]) is the only place that rejects malformed values (empty strings); beyond
/// that, the indexer treats a `UserId` as an opaque key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<String> for UserId {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl std::borrow::Borrow<str> for UserId {
    fn borrow(&self) -> &str { &self.0 }
}

/// Permission bitmask: `Read | Write | Invite | Expel`, combinable.
///
/// The perma-node's own signer (the "owner") always holds every bit; this is enforced by
/// [`crate::ot::OTHistory::has_permission`] rather than by populating the map with the owner's
/// entry.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct PermBits(u8);

impl PermBits {
    pub const NONE: PermBits = PermBits(0);
    pub const READ: PermBits = PermBits(1);
    pub const WRITE: PermBits = PermBits(2);
    pub const INVITE: PermBits = PermBits(4);
    pub const EXPEL: PermBits = PermBits(8);
    pub const ALL: PermBits = PermBits(1 | 2 | 4 | 8);

    pub const fn from_bits(bits: u8) -> Self { PermBits(bits) }

    pub const fn bits(self) -> u8 { self.0 }

    pub const fn contains(self, mask: PermBits) -> bool { self.0 & mask.0 == mask.0 }

    pub const fn union(self, other: PermBits) -> Self { PermBits(self.0 | other.0) }

    pub const fn difference(self, other: PermBits) -> Self { PermBits(self.0 & !other.0) }

    pub const fn is_empty(self) -> bool { self.0 == 0 }
}

impl std::ops::BitOr for PermBits {
    type Output = PermBits;

    fn bitor(self, rhs: Self) -> Self::Output { self.union(rhs) }
}

impl fmt::Display for PermBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(PermBits::READ) {
            parts.push("read");
        }
        if self.contains(PermBits::WRITE) {
            parts.push("write");
        }
        if self.contains(PermBits::INVITE) {
            parts.push("invite");
        }
        if self.contains(PermBits::EXPEL) {
            parts.push("expel");
        }
        if parts.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&parts.join("|"))
    }
}
