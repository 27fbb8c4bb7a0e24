// SPDX-License-Identifier: Apache-2.0

//! Application listener events. The Indexer Core fans events out to every registered
//! [`Listener`], mirroring `hypersonic`'s own separation between core state mutation and
//! external notification.

use crate::blobref::BlobRef;
use crate::node::PermAction;
use crate::user::UserId;

/// A logically meaningful event raised while indexing a blob.
#[derive(Clone, Debug)]
pub enum Event {
    /// Raised when an Invite `Permission` targeting the local user is seen, even before its
    /// dependencies have all arrived — the user must be told to accept before the content data
    /// has arrived.
    Invitation { perma: BlobRef, invitation: BlobRef },

    /// The local user's own Keep accepting `invitation` was just applied.
    AcceptedInvitation { perma: BlobRef, invitation: BlobRef, keep: BlobRef },

    /// A Keep completed document membership: either the owner's self-keep (`invitation` empty) or
    /// the local user's acceptance of an invitation.
    PermaNode { perma: BlobRef, invitation: Option<BlobRef>, keep: BlobRef },

    /// A remote user accepted an invitation the local user issued.
    NewFollower { perma: BlobRef, invitation: BlobRef, keep: BlobRef, user: UserId },

    /// An OT `Mutation` was applied to a perma-node's history.
    Mutation { perma: BlobRef, mutation: BlobRef },

    /// A `Permission` was applied to a perma-node's history.
    Permission { perma: BlobRef, action: PermAction, permission: BlobRef },
}

/// Application-level event sink.
///
/// The Indexer Core holds a set of listeners and fans every [`Event`] out to all of them, in
/// registration order, synchronously from within `handle_blob`.
pub trait Listener {
    fn on_event(&mut self, event: Event);
}

/// A [`Listener`] that records every event it receives, in order. Useful in tests and as a
/// starting point for application wiring.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Vec<Event>,
}

impl Listener for RecordingListener {
    fn on_event(&mut self, event: Event) { self.events.push(event); }
}
