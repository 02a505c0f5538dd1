//! Per (chain, token) watchers and the registry that owns them.

mod bond;
mod commit;
mod relay;

pub use bond::{BondCycleReport, BondDecision, BondWatcher};
pub use commit::{CommitDecision, CommitReason, CommitWatcher};
pub use relay::{RelayOutcome, RelayReport, RelayRequest, RelayWatcher};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{Chain, Config, Token};
use crate::error::{Result, RootwatchError};
use crate::gateway::ContractGateway;
use crate::indexer::EventSource;

/// A watcher driven by the service's polling loop
#[async_trait]
pub trait PollingWatcher: Send + Sync {
    fn label(&self) -> String;

    /// One poll cycle. Errors end the cycle; the next tick starts fresh.
    async fn poll(&self) -> Result<()>;
}

pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherKind {
    Commit,
    Bond,
    Relay,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherSummary {
    pub kind: WatcherKind,
    pub chain: Chain,
    pub token: Token,
    pub dry_run: bool,
}

/// Every watcher, keyed by the (chain, token) pair it serves. Built once at
/// start-up from configuration.
pub struct WatcherRegistry {
    commit: BTreeMap<(Chain, Token), Arc<CommitWatcher>>,
    bond: BTreeMap<(Chain, Token), Arc<BondWatcher>>,
    relay: BTreeMap<(Chain, Token), Arc<RelayWatcher>>,
    dry_run: bool,
}

impl WatcherRegistry {
    pub fn build(
        config: &Config,
        gateway: Arc<dyn ContractGateway>,
        events: Arc<dyn EventSource>,
        dry_run: bool,
    ) -> Result<Self> {
        let mut commit = BTreeMap::new();
        let mut bond = BTreeMap::new();
        let mut relay = BTreeMap::new();

        for (chain, token) in config.source_pairs() {
            let key = (chain, token);

            commit.insert(
                key,
                Arc::new(
                    CommitWatcher::new(chain, token, config, gateway.clone(), events.clone())?
                        .with_dry_run(dry_run),
                ),
            );
            bond.insert(
                key,
                Arc::new(
                    BondWatcher::new(chain, token, config, gateway.clone(), events.clone())?
                        .with_dry_run(dry_run),
                ),
            );
            relay.insert(
                key,
                Arc::new(
                    RelayWatcher::new(chain, token, config, gateway.clone(), events.clone())?
                        .with_dry_run(dry_run),
                ),
            );
        }

        info!(
            "📋 Registered watchers for {} chain/token pairs{}",
            commit.len(),
            if dry_run { " (dry run)" } else { "" }
        );

        Ok(Self {
            commit,
            bond,
            relay,
            dry_run,
        })
    }

    pub fn commit_watcher(&self, chain: Chain, token: Token) -> Result<Arc<CommitWatcher>> {
        self.commit
            .get(&(chain, token))
            .cloned()
            .ok_or_else(|| RootwatchError::watcher_not_found(chain, token))
    }

    pub fn bond_watcher(&self, chain: Chain, token: Token) -> Result<Arc<BondWatcher>> {
        self.bond
            .get(&(chain, token))
            .cloned()
            .ok_or_else(|| RootwatchError::watcher_not_found(chain, token))
    }

    pub fn relay_watcher(&self, chain: Chain, token: Token) -> Result<Arc<RelayWatcher>> {
        self.relay
            .get(&(chain, token))
            .cloned()
            .ok_or_else(|| RootwatchError::watcher_not_found(chain, token))
    }

    /// Every watcher as a polling task. Relay watchers are only included for
    /// chains with redeemable L1→L2 messages.
    pub fn polling_watchers(&self) -> Vec<(WatcherKind, Arc<dyn PollingWatcher>)> {
        let mut watchers: Vec<(WatcherKind, Arc<dyn PollingWatcher>)> = Vec::new();

        for watcher in self.commit.values() {
            watchers.push((WatcherKind::Commit, watcher.clone()));
        }
        for watcher in self.bond.values() {
            watchers.push((WatcherKind::Bond, watcher.clone()));
        }
        for watcher in self
            .relay
            .values()
            .filter(|w| w.chain().uses_retryable_tickets())
        {
            watchers.push((WatcherKind::Relay, watcher.clone()));
        }

        watchers
    }

    pub fn summaries(&self) -> Vec<WatcherSummary> {
        let summary = |kind, (chain, token): &(Chain, Token)| WatcherSummary {
            kind,
            chain: *chain,
            token: *token,
            dry_run: self.dry_run,
        };

        self.commit
            .keys()
            .map(|k| summary(WatcherKind::Commit, k))
            .chain(self.bond.keys().map(|k| summary(WatcherKind::Bond, k)))
            .chain(self.relay.keys().map(|k| summary(WatcherKind::Relay, k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, StaticEventSource, TEST_CONFIG};

    fn registry() -> WatcherRegistry {
        let config = Config::from_toml_str(TEST_CONFIG).unwrap();
        WatcherRegistry::build(
            &config,
            Arc::new(FakeGateway::new()),
            Arc::new(StaticEventSource::new()),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_registry_lookup() {
        let registry = registry();
        assert!(registry.commit_watcher(Chain::Optimism, Token::Usdc).is_ok());
        assert!(registry.bond_watcher(Chain::Arbitrum, Token::Eth).is_ok());

        let err = registry
            .commit_watcher(Chain::Ethereum, Token::Usdc)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Watcher not found for ethereum/USDC");
        assert!(registry.relay_watcher(Chain::Optimism, Token::Eth).is_err());
    }

    #[test]
    fn test_polling_watchers_skip_optimism_relays() {
        let registry = registry();
        let labels: Vec<String> = registry
            .polling_watchers()
            .iter()
            .map(|(_, w)| w.label())
            .collect();

        assert!(labels.contains(&"commit:optimism:USDC".to_string()));
        assert!(labels.contains(&"relay:arbitrum:ETH".to_string()));
        assert!(!labels.contains(&"relay:optimism:USDC".to_string()));
        assert_eq!(labels.len(), 5);
    }

    #[test]
    fn test_summaries() {
        let registry = registry();
        assert_eq!(registry.summaries().len(), 6);
    }
}
