// SPDX-License-Identifier: Apache-2.0

//! Indexer configuration: the one piece of local identity the core needs (the local user id),
//! loadable from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// On-disk configuration for an [`crate::indexer::Indexer`] instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// The local user's id (`name@domain`), used to decide which invitations/keeps/forwards are
    /// ours throughout the indexing pipeline.
    pub user_id: UserId,
}

impl IndexerConfig {
    pub fn new(user_id: impl Into<UserId>) -> Self { Self { user_id: user_id.into() } }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(text)?) }
}

#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ConfigError {
    /// failed to read indexer configuration file: {0}
    #[from]
    Io(std::io::Error),

    /// failed to parse indexer configuration: {0}
    #[from]
    Toml(toml::de::Error),
}
