use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Chain, Token};
use crate::types::RootHash;

/// Outcome of reconciling one (chain, token) pair
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub chain: Chain,
    pub token: Token,
    pub committed_count: usize,
    pub confirmed_count: usize,
    pub bonded_count: usize,
    /// Committed roots neither confirmed nor bonded, in commit order
    pub unverified: Vec<RootHash>,
    /// Unverified roots committed longer ago than the stall timeout
    pub stalled: Vec<RootHash>,
    pub timestamp: DateTime<Utc>,
}

impl VerificationReport {
    pub fn new(chain: Chain, token: Token) -> Self {
        Self {
            chain,
            token,
            committed_count: 0,
            confirmed_count: 0,
            bonded_count: 0,
            unverified: Vec::new(),
            stalled: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_counts(mut self, committed: usize, confirmed: usize, bonded: usize) -> Self {
        self.committed_count = committed;
        self.confirmed_count = confirmed;
        self.bonded_count = bonded;
        self
    }

    pub fn with_unverified(mut self, unverified: Vec<RootHash>) -> Self {
        self.unverified = unverified;
        self
    }

    pub fn with_stalled(mut self, stalled: Vec<RootHash>) -> Self {
        self.stalled = stalled;
        self
    }

    pub fn is_clean(&self) -> bool {
        self.unverified.is_empty()
    }

    /// Operator-facing summary, one line per entry
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Commits retrieved: {}", self.committed_count),
            format!("Confirms retrieved: {}", self.confirmed_count),
            format!("Bonds retrieved: {}", self.bonded_count),
            format!("There are {} unverified roots.", self.unverified.len()),
        ];
        lines.extend(self.unverified.iter().map(|root| root.to_string()));
        lines
    }
}
