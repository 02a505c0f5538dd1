use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{unix_now, PollingWatcher};
use crate::config::{Chain, Config, Token};
use crate::error::{Result, RootwatchError};
use crate::gateway::ContractGateway;
use crate::indexer::{EventSource, IndexedRecord, INITIAL_CURSOR};
use crate::types::{RootHash, TxHash};

/// Why a commit was due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitReason {
    Threshold,
    MaxInterval,
    Forced,
}

/// Outcome of one commit check for a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CommitDecision {
    NothingPending,
    NotDue { amount: U256 },
    InFlight { tx_hash: TxHash },
    /// Dry run: what would have been sent
    WouldCommit { amount: U256, reason: CommitReason },
    Committed {
        tx_hash: TxHash,
        amount: U256,
        reason: CommitReason,
    },
    /// Another process committed the batch first
    AlreadyCommitted,
}

#[derive(Debug, Clone, Copy)]
struct IndexedRoot {
    root_hash: RootHash,
    block_number: u64,
}

#[derive(Debug, Clone)]
struct InFlightCommit {
    tx_hash: TxHash,
    fingerprint: RootHash,
    submitted_at: Instant,
}

/// Commits pending transfers from one source chain, for one token
pub struct CommitWatcher {
    chain: Chain,
    token: Token,
    destinations: Vec<Chain>,
    min_threshold: U256,
    max_commit_interval: Duration,
    in_flight_timeout: Duration,
    dry_run: bool,
    gateway: Arc<dyn ContractGateway>,
    events: Arc<dyn EventSource>,
    in_flight: Mutex<HashMap<u64, InFlightCommit>>,
    // Most recent indexed root per destination chain id
    latest_roots: Mutex<HashMap<u64, IndexedRoot>>,
    // Last committed record seen, so each check only reads new commits
    cursor: Mutex<String>,
}

impl CommitWatcher {
    pub fn new(
        chain: Chain,
        token: Token,
        config: &Config,
        gateway: Arc<dyn ContractGateway>,
        events: Arc<dyn EventSource>,
    ) -> Result<Self> {
        config.ensure_pair(chain, token)?;
        let token_config = config.token(token)?;

        let destinations = config
            .token_chains(token)
            .into_iter()
            .filter(|c| *c != chain)
            .collect();

        Ok(Self {
            chain,
            token,
            destinations,
            min_threshold: token_config.min_commit_threshold,
            max_commit_interval: config.max_commit_interval(),
            in_flight_timeout: Duration::from_secs(config.commit.in_flight_timeout_secs),
            dry_run: false,
            gateway,
            events,
            in_flight: Mutex::new(HashMap::new()),
            latest_roots: Mutex::new(HashMap::new()),
            cursor: Mutex::new(INITIAL_CURSOR.to_string()),
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn destinations(&self) -> &[Chain] {
        &self.destinations
    }

    /// Operator-requested commit towards `destination`
    pub async fn commit_now(&self, destination: Chain) -> Result<CommitDecision> {
        if !self.destinations.contains(&destination) {
            return Err(RootwatchError::validation(format!(
                "{} is not a destination for {} from {}",
                destination, self.token, self.chain
            )));
        }

        self.check_if_should_commit(destination.chain_id(), true).await
    }

    /// Decide whether the pending batch for `destination_chain_id` is due, and
    /// commit it if so
    pub async fn check_if_should_commit(
        &self,
        destination_chain_id: u64,
        force: bool,
    ) -> Result<CommitDecision> {
        let batch = self
            .gateway
            .pending_batch(self.chain, self.token, destination_chain_id)
            .await?;

        if batch.is_empty() {
            self.lock_in_flight().remove(&destination_chain_id);
            debug!(
                "{} {} -> {}: nothing pending",
                self.token, self.chain, destination_chain_id
            );
            return Ok(CommitDecision::NothingPending);
        }

        let fingerprint = batch.fingerprint();
        self.observe_commits().await?;

        if self.latest_root(destination_chain_id) == Some(fingerprint) {
            self.lock_in_flight().remove(&destination_chain_id);
            info!(
                "{} {} -> {}: batch already committed as root {}",
                self.token, self.chain, destination_chain_id, fingerprint
            );
            return Ok(CommitDecision::AlreadyCommitted);
        }

        if let Some(tx_hash) = self.in_flight_for(destination_chain_id, fingerprint) {
            debug!(
                "{} {} -> {}: commit {} still in flight",
                self.token, self.chain, destination_chain_id, tx_hash
            );
            return Ok(CommitDecision::InFlight { tx_hash });
        }

        let reason = match self.due_reason(destination_chain_id, batch.amount, force).await? {
            Some(reason) => reason,
            None => {
                return Ok(CommitDecision::NotDue {
                    amount: batch.amount,
                })
            }
        };

        if self.dry_run {
            info!(
                "[dry] Would commit {} {} from {} to {} ({:?})",
                batch.amount, self.token, self.chain, destination_chain_id, reason
            );
            return Ok(CommitDecision::WouldCommit {
                amount: batch.amount,
                reason,
            });
        }

        match self
            .gateway
            .commit(self.chain, self.token, destination_chain_id)
            .await
        {
            Ok(tx_hash) => {
                info!(
                    "✅ Committed {} {} from {} to {}: {}",
                    batch.amount, self.token, self.chain, destination_chain_id, tx_hash
                );
                self.lock_in_flight().insert(
                    destination_chain_id,
                    InFlightCommit {
                        tx_hash,
                        fingerprint,
                        submitted_at: Instant::now(),
                    },
                );
                Ok(CommitDecision::Committed {
                    tx_hash,
                    amount: batch.amount,
                    reason,
                })
            }
            Err(e) if e.is_benign_race() => {
                info!(
                    "{} {} -> {} already committed: {}",
                    self.token, self.chain, destination_chain_id, e
                );
                Ok(CommitDecision::AlreadyCommitted)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn due_reason(
        &self,
        destination_chain_id: u64,
        amount: U256,
        force: bool,
    ) -> Result<Option<CommitReason>> {
        if amount >= self.min_threshold {
            return Ok(Some(CommitReason::Threshold));
        }

        let last_commit = self
            .gateway
            .last_commit_time(self.chain, self.token, destination_chain_id)
            .await?;
        let since_last = unix_now().saturating_sub(last_commit);
        if since_last >= self.max_commit_interval.as_secs() {
            return Ok(Some(CommitReason::MaxInterval));
        }

        if force {
            return Ok(Some(CommitReason::Forced));
        }

        debug!(
            "{} {} -> {}: {} below threshold {}, last commit {}s ago",
            self.token, self.chain, destination_chain_id, amount, self.min_threshold, since_last
        );
        Ok(None)
    }

    /// Read commits indexed since the last check, track the latest root per
    /// destination and retire in-flight entries they cover
    async fn observe_commits(&self) -> Result<()> {
        let since = self.lock_cursor().clone();
        let records = self
            .events
            .transfers_committed(self.chain, self.token, &since)
            .await?;

        let Some(last) = records.last() else {
            return Ok(());
        };
        *self.lock_cursor() = last.id().to_string();

        {
            let mut latest = self.lock_latest_roots();
            for record in &records {
                let newer = latest
                    .get(&record.destination_chain_id)
                    .map(|seen| record.block_number >= seen.block_number)
                    .unwrap_or(true);
                if newer {
                    latest.insert(
                        record.destination_chain_id,
                        IndexedRoot {
                            root_hash: record.root_hash,
                            block_number: record.block_number,
                        },
                    );
                }
            }
        }

        let mut in_flight = self.lock_in_flight();
        for record in &records {
            let observed = in_flight
                .get(&record.destination_chain_id)
                .map(|f| f.tx_hash == record.transaction_hash || f.fingerprint == record.root_hash)
                .unwrap_or(false);

            if observed {
                debug!(
                    "{} {} -> {}: commit observed as root {}",
                    self.token, self.chain, record.destination_chain_id, record.root_hash
                );
                in_flight.remove(&record.destination_chain_id);
            }
        }

        Ok(())
    }

    fn latest_root(&self, destination_chain_id: u64) -> Option<RootHash> {
        self.lock_latest_roots()
            .get(&destination_chain_id)
            .map(|root| root.root_hash)
    }

    fn in_flight_for(&self, destination_chain_id: u64, fingerprint: RootHash) -> Option<TxHash> {
        let mut in_flight = self.lock_in_flight();
        let entry = in_flight.get(&destination_chain_id)?.clone();

        if entry.submitted_at.elapsed() >= self.in_flight_timeout {
            warn!(
                "{} {} -> {}: commit {} not observed after {:?}, giving up on it",
                self.token, self.chain, destination_chain_id, entry.tx_hash, self.in_flight_timeout
            );
            in_flight.remove(&destination_chain_id);
            return None;
        }

        (entry.fingerprint == fingerprint).then_some(entry.tx_hash)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<u64, InFlightCommit>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_latest_roots(&self) -> std::sync::MutexGuard<'_, HashMap<u64, IndexedRoot>> {
        self.latest_roots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, String> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PollingWatcher for CommitWatcher {
    fn label(&self) -> String {
        format!("commit:{}:{}", self.chain, self.token)
    }

    async fn poll(&self) -> Result<()> {
        for destination in &self.destinations {
            match self.check_if_should_commit(destination.chain_id(), false).await {
                Ok(decision) => debug!("{} -> {}: {:?}", self.label(), destination, decision),
                Err(e) => warn!("{} -> {} failed: {}", self.label(), destination, e),
            }
        }
        Ok(())
    }
}
