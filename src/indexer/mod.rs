//! Typed, paginated access to the hosted per-chain subgraphs.
//!
//! Every query is cursor-continued on the record `id`: a page of exactly
//! [`PAGE_SIZE`] records means another page may follow, anything shorter ends
//! the sequence. Each page request runs under its own timeout and retry budget
//! (see [`crate::service::backoff`]), so a long history never has to be read
//! inside one deadline.

mod client;
mod queries;
mod records;

pub use client::GraphIndexer;
pub use queries::QueryKind;
pub use records::{BondedRecord, ChallengedRecord, CommittedRecord, ConfirmedRecord, IndexedRecord};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Chain, Token};

/// Fixed page size of every subgraph query
pub const PAGE_SIZE: usize = 1000;

/// Cursor preceding every real record id
pub const INITIAL_CURSOR: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("indexer request failed: {0}")]
    Http(String),

    #[error("indexer returned HTTP {0}")]
    Status(u16),

    #[error("indexer request timed out")]
    Timeout,

    #[error("indexer query failed: {0}")]
    Query(String),

    #[error("malformed {kind} response: {reason}")]
    Decode { kind: &'static str, reason: String },

    #[error("no indexer configured for {0}")]
    UnknownChain(Chain),
}

impl IndexerError {
    /// Malformed data and missing endpoints will not fix themselves on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode { .. } | Self::UnknownChain(_))
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Read-only source of indexed bridge events.
///
/// Each method returns every record after `since_id`, fully paginated, in id
/// order. Use [`INITIAL_CURSOR`] to read from the beginning.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn transfers_committed(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> Result<Vec<CommittedRecord>, IndexerError>;

    async fn transfer_roots_confirmed(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> Result<Vec<ConfirmedRecord>, IndexerError>;

    async fn transfer_roots_bonded(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> Result<Vec<BondedRecord>, IndexerError>;

    async fn transfer_bonds_challenged(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> Result<Vec<ChallengedRecord>, IndexerError>;
}

/// Position within a paginated query. Plain data, so a sequence can be
/// resumed from any cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    last_id: String,
    done: bool,
}

impl PageCursor {
    pub fn new(since_id: impl Into<String>) -> Self {
        Self {
            last_id: since_id.into(),
            done: false,
        }
    }

    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Move past a fetched page
    pub fn advance<T: IndexedRecord>(&mut self, page: &[T]) {
        if let Some(last) = page.last() {
            self.last_id = last.id().to_string();
        }
        if page.len() < PAGE_SIZE {
            self.done = true;
        }
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR)
    }
}
