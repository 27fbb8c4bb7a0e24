// SPDX-License-Identifier: Apache-2.0

//! Indexer core for a federated, content-addressed collaborative document store.
//!
//! A document ("perma-node") is a DAG of signed, content-addressed blobs: mutations under
//! operational transform, permission grants, and membership "keeps". This crate consumes blobs in
//! whatever order a peer-to-peer network happens to deliver them and reconstructs a causally
//! consistent view for each document, folding permission state and driving which blobs get
//! forwarded to which peers next.
//!
//! The entry point is [`indexer::Indexer`]. It is generic over two collaborators the embedding
//! application supplies: [`store::BlobStore`] (durable blob storage) and [`federation::Federation`]
//! (peer forwarding). A third, [`ot::OtTransformer`], plugs in the document schema's own transform
//! math; the core only knows when to invoke it.

#![deny(unused_variables, unused_mut, unused_imports, non_upper_case_globals, non_camel_case_types, non_snake_case)]

#[macro_use]
extern crate amplify;

pub mod blobref;
pub mod config;
pub mod envelope;
pub mod events;
pub mod federation;
pub mod indexer;
pub mod node;
pub mod ot;
pub mod queue;
pub mod store;
pub mod user;

pub use blobref::BlobRef;
pub use config::{ConfigError, IndexerConfig};
pub use envelope::{ClassifyError, Classification};
pub use events::{Event, Listener, RecordingListener};
pub use federation::{Federation, NeverFails, NullFederation};
pub use indexer::{HandleError, HandleOutcome, Indexer};
pub use node::{Node, NodeKind, PermAction};
pub use ot::{HistoryItem, HistoryPayload, IdentityTransformer, OTHistory, OtTransformer};
pub use queue::DependencyQueue;
pub use store::BlobStore;
pub use user::{PermBits, UserId};
