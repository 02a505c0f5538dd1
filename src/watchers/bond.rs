use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{unix_now, PollingWatcher};
use crate::config::{Chain, Config, Token};
use crate::error::Result;
use crate::gateway::{ChainCallError, ContractGateway};
use crate::indexer::{CommittedRecord, EventSource, INITIAL_CURSOR};
use crate::lifecycle::{self, ActionPolicy, RootAction, RootEvent, RootState};
use crate::types::{Bond, RootHash, TransferRoot, TxHash};

/// Outcome for one committed root in a bond cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BondDecision {
    Bonded { tx_hash: TxHash },
    /// Dry run: what would have been sent
    WouldBond { amount: U256 },
    /// Another bonder got there first
    AlreadyBonded,
    InFlight,
    DeferredTooLarge { amount: U256 },
    DeferredLiquidity { amount: U256, available: U256 },
    /// Bonder ran out of funds; needs an operator
    InsufficientFunds,
    /// Destination chain id is not one rootwatch knows
    UnknownDestination { chain_id: u64 },
    /// Committed, unbonded and unconfirmed past the stall timeout
    Stalled,
}

/// Per-root decisions from one bond cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct BondCycleReport {
    pub decisions: Vec<(RootHash, BondDecision)>,
    pub skipped_stale: usize,
    /// Bonds posted against this chain's roots, challenged ones flagged
    pub bonds: Vec<Bond>,
}

impl BondCycleReport {
    pub fn decision(&self, root_hash: RootHash) -> Option<&BondDecision> {
        self.decisions
            .iter()
            .find(|(hash, _)| *hash == root_hash)
            .map(|(_, d)| d)
    }
}

/// Bonds committed transfer roots from one source chain, for one token
pub struct BondWatcher {
    chain: Chain,
    token: Token,
    max_bond_size: U256,
    policy: ActionPolicy,
    stall_timeout: Duration,
    in_flight_timeout: Duration,
    dry_run: bool,
    gateway: Arc<dyn ContractGateway>,
    events: Arc<dyn EventSource>,
    in_flight: Mutex<HashMap<RootHash, Instant>>,
}

impl BondWatcher {
    pub fn new(
        chain: Chain,
        token: Token,
        config: &Config,
        gateway: Arc<dyn ContractGateway>,
        events: Arc<dyn EventSource>,
    ) -> Result<Self> {
        config.ensure_pair(chain, token)?;

        Ok(Self {
            chain,
            token,
            max_bond_size: config.token(token)?.max_bond_size,
            policy: ActionPolicy {
                staleness_cutoff: config.bond_staleness_cutoff(),
            },
            stall_timeout: config.stall_timeout(),
            in_flight_timeout: Duration::from_secs(config.bond.in_flight_timeout_secs),
            dry_run: false,
            gateway,
            events,
            in_flight: Mutex::new(HashMap::new()),
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

    /// Classify every committed root and bond the ones that are due
    pub async fn run_cycle(&self) -> Result<BondCycleReport> {
        let committed = self
            .events
            .transfers_committed(self.chain, self.token, INITIAL_CURSOR)
            .await?;
        let confirmed = self
            .events
            .transfer_roots_confirmed(Chain::ROOT, self.token, INITIAL_CURSOR)
            .await?;
        let bonded = self
            .events
            .transfer_roots_bonded(Chain::ROOT, self.token, INITIAL_CURSOR)
            .await?;
        let challenged = self
            .events
            .transfer_bonds_challenged(Chain::ROOT, self.token, INITIAL_CURSOR)
            .await?;

        let events = committed
            .iter()
            .map(RootEvent::from)
            .chain(confirmed.iter().map(RootEvent::from))
            .chain(bonded.iter().map(RootEvent::from))
            .chain(challenged.iter().map(RootEvent::from));
        let grouped = lifecycle::group_by_root(events);

        let now = unix_now();
        let mut report = BondCycleReport::default();
        let mut seen = HashSet::new();

        for record in &committed {
            if !seen.insert(record.root_hash) {
                continue;
            }

            let root_events = grouped
                .get(&record.root_hash)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let state = lifecycle::classify_at(record.root_hash, root_events, now, self.stall_timeout);
            self.retire_in_flight(record.root_hash, state);

            let root = TransferRoot::from_record(self.chain, record);
            let age = Duration::from_secs(root.age_seconds(now));

            let decision = match lifecycle::due_action(state, age, &self.policy) {
                Some(RootAction::Bond) => match self.bond_root(record).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warn!("Bond of root {} failed: {}", record.root_hash, e);
                        continue;
                    }
                },
                Some(RootAction::Alert) => {
                    warn!(
                        "⚠️ Root {} from {} committed {}s ago is neither bonded nor confirmed",
                        record.root_hash,
                        self.chain,
                        age.as_secs()
                    );
                    BondDecision::Stalled
                }
                None => {
                    if state == RootState::Committed {
                        report.skipped_stale += 1;
                    }
                    continue;
                }
            };

            report.decisions.push((record.root_hash, decision));
        }

        let challenged_roots: HashSet<RootHash> = challenged.iter().map(|r| r.root_hash).collect();
        report.bonds = bonded
            .iter()
            .filter(|r| seen.contains(&r.root))
            .map(|r| Bond::from(r).with_challenged(challenged_roots.contains(&r.root)))
            .collect();
        for bond in report.bonds.iter().filter(|b| b.challenged) {
            warn!("⚠️ Bond on root {} from {} was challenged", bond.root_hash, self.chain);
        }

        debug!(
            "{} {}: {} committed roots, {} decisions, {} stale",
            self.chain,
            self.token,
            committed.len(),
            report.decisions.len(),
            report.skipped_stale
        );
        Ok(report)
    }

    async fn bond_root(&self, record: &CommittedRecord) -> Result<BondDecision> {
        let root_hash = record.root_hash;
        let amount = record.total_amount;

        if self.is_in_flight(root_hash) {
            return Ok(BondDecision::InFlight);
        }

        if amount > self.max_bond_size {
            debug!(
                "Root {} amount {} exceeds max bond size {}",
                root_hash, amount, self.max_bond_size
            );
            return Ok(BondDecision::DeferredTooLarge { amount });
        }

        let Some(destination) = Chain::from_chain_id(record.destination_chain_id) else {
            warn!(
                "Root {} has unknown destination chain id {}",
                root_hash, record.destination_chain_id
            );
            return Ok(BondDecision::UnknownDestination {
                chain_id: record.destination_chain_id,
            });
        };

        let available = self.gateway.available_liquidity(destination, self.token).await?;
        if available < amount {
            info!(
                "Deferring bond of root {}: needs {} {}, {} available",
                root_hash, amount, self.token, available
            );
            return Ok(BondDecision::DeferredLiquidity { amount, available });
        }

        if self.dry_run {
            info!("[dry] Would bond root {} for {} {}", root_hash, amount, self.token);
            return Ok(BondDecision::WouldBond { amount });
        }

        match self
            .gateway
            .bond(self.token, root_hash, record.destination_chain_id, amount)
            .await
        {
            Ok(tx_hash) => {
                info!("✅ Bonded root {} for {} {}: {}", root_hash, amount, self.token, tx_hash);
                self.mark_in_flight(root_hash);
                Ok(BondDecision::Bonded { tx_hash })
            }
            Err(e) if e.is_benign_race() => {
                info!("Root {} already bonded", root_hash);
                self.mark_in_flight(root_hash);
                Ok(BondDecision::AlreadyBonded)
            }
            Err(ChainCallError::InsufficientFunds) => {
                error!(
                    "🚨 Bonder has insufficient funds to bond root {} ({} {})",
                    root_hash, amount, self.token
                );
                Ok(BondDecision::InsufficientFunds)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_in_flight(&self, root_hash: RootHash) -> bool {
        let mut in_flight = self.lock_in_flight();
        match in_flight.get(&root_hash) {
            Some(at) if at.elapsed() < self.in_flight_timeout => true,
            Some(_) => {
                warn!("Bond of root {} not observed in time, retrying", root_hash);
                in_flight.remove(&root_hash);
                false
            }
            None => false,
        }
    }

    fn mark_in_flight(&self, root_hash: RootHash) {
        self.lock_in_flight().insert(root_hash, Instant::now());
    }

    /// Forget in-flight bonds once the indexer shows the root moved on
    fn retire_in_flight(&self, root_hash: RootHash, state: RootState) {
        if matches!(state, RootState::Committed | RootState::Stalled | RootState::Pending) {
            return;
        }
        self.lock_in_flight().remove(&root_hash);
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<RootHash, Instant>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PollingWatcher for BondWatcher {
    fn label(&self) -> String {
        format!("bond:{}:{}", self.chain, self.token)
    }

    async fn poll(&self) -> Result<()> {
        let report = self.run_cycle().await?;
        for (root_hash, decision) in &report.decisions {
            debug!("{} root {}: {:?}", self.label(), root_hash, decision);
        }
        Ok(())
    }
}
