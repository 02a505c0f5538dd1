use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::report::VerificationReport;
use crate::config::{Chain, Token};
use crate::error::Result;
use crate::indexer::{EventSource, INITIAL_CURSOR};
use crate::types::RootHash;

/// Finds committed roots that were never confirmed or bonded. Read-only and
/// safe to run alongside the watchers.
pub struct ReconciliationVerifier {
    events: Arc<dyn EventSource>,
    stall_timeout: Duration,
}

impl ReconciliationVerifier {
    pub fn new(events: Arc<dyn EventSource>, stall_timeout: Duration) -> Self {
        Self {
            events,
            stall_timeout,
        }
    }

    /// `committed - confirmed - bonded` for roots committed on `chain`
    pub async fn verify(&self, chain: Chain, token: Token) -> Result<VerificationReport> {
        let committed = self
            .events
            .transfers_committed(chain, token, INITIAL_CURSOR)
            .await?;
        info!("Commits retrieved: {}", committed.len());

        let confirmed = self
            .events
            .transfer_roots_confirmed(Chain::ROOT, token, INITIAL_CURSOR)
            .await?;
        info!("Confirms retrieved: {}", confirmed.len());

        let bonded = self
            .events
            .transfer_roots_bonded(Chain::ROOT, token, INITIAL_CURSOR)
            .await?;
        info!("Bonds retrieved: {}", bonded.len());

        let settled: HashSet<RootHash> = confirmed
            .iter()
            .map(|r| r.root_hash)
            .chain(bonded.iter().map(|r| r.root))
            .collect();

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let mut seen = HashSet::new();
        let mut unverified = Vec::new();
        let mut stalled = Vec::new();

        for record in &committed {
            if settled.contains(&record.root_hash) || !seen.insert(record.root_hash) {
                continue;
            }

            unverified.push(record.root_hash);
            if now.saturating_sub(record.committed_at()) >= self.stall_timeout.as_secs() {
                stalled.push(record.root_hash);
            }
        }

        if !unverified.is_empty() {
            warn!(
                "{} {}: {} unverified roots ({} stalled)",
                chain,
                token,
                unverified.len(),
                stalled.len()
            );
        }

        Ok(VerificationReport::new(chain, token)
            .with_counts(committed.len(), confirmed.len(), bonded.len())
            .with_unverified(unverified)
            .with_stalled(stalled))
    }
}
