use thiserror::Error;

use crate::config::{Chain, Token};
use crate::gateway::ChainCallError;
use crate::indexer::IndexerError;

/// All possible errors in the rootwatch system
#[derive(Debug, Error)]
pub enum RootwatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("Chain call failed: {0}")]
    ChainCall(#[from] ChainCallError),

    #[error("Watcher not found for {chain}/{token}")]
    WatcherNotFound { chain: Chain, token: Token },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RootwatchError>;

impl RootwatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn watcher_not_found(chain: Chain, token: Token) -> Self {
        Self::WatcherNotFound { chain, token }
    }

    /// Errors that the next poll cycle may clear on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Indexer(e) => e.is_retryable(),
            Self::ChainCall(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for RootwatchError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
