mod chain;

pub use chain::{Chain, Token};

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RootwatchError};
use crate::types::de;

/// Environment variable holding the bonder's signing key
pub const SIGNER_KEY_ENV: &str = "BONDER_PRIVATE_KEY";

/// Prefix for environment overrides, e.g. `ROOTWATCH__COMMIT__POLL_INTERVAL_MS`
pub const ENV_PREFIX: &str = "ROOTWATCH";

/// rootwatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: BTreeMap<Chain, ChainConfig>,
    pub tokens: BTreeMap<Token, TokenConfig>,
    pub commit: CommitConfig,
    pub bond: BondConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub indexer_url: String,
}

/// Per-token thresholds and bridge deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Pending amount at which a commit becomes due
    #[serde(deserialize_with = "de::u256_from_str")]
    pub min_commit_threshold: U256,
    /// Largest root this bonder will bond
    #[serde(deserialize_with = "de::u256_from_str")]
    pub max_bond_size: U256,
    pub bridges: BTreeMap<Chain, Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub max_commit_interval_secs: u64,
    #[serde(default = "default_in_flight_timeout_secs")]
    pub in_flight_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Roots committed longer ago than this are left to confirm on their own
    pub staleness_cutoff_secs: u64,
    #[serde(default = "default_in_flight_timeout_secs")]
    pub in_flight_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Committed roots older than this with no bond or confirmation are stalled
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub max_send_attempts: u32,
    pub gas_bump_percent: u64,
    /// Falls back to `BONDER_PRIVATE_KEY` when unset
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub rest_port: Option<u16>,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_in_flight_timeout_secs() -> u64 {
    600
}

fn default_stall_timeout_secs() -> u64 {
    86_400
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: 3,
            gas_bump_percent: 20,
            private_key: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, overlaid with `ROOTWATCH__*` env vars
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Self::from_settings(settings)
    }

    /// Parse configuration from an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let mut config: Config = settings.try_deserialize()?;

        if config.gateway.private_key.is_none() {
            config.gateway.private_key = std::env::var(SIGNER_KEY_ENV).ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.chains.contains_key(&Chain::ROOT) {
            return Err(RootwatchError::config(format!(
                "Root chain '{}' must be configured",
                Chain::ROOT
            )));
        }

        for (chain, chain_config) in &self.chains {
            for (name, url) in [
                ("rpc_url", &chain_config.rpc_url),
                ("indexer_url", &chain_config.indexer_url),
            ] {
                reqwest::Url::parse(url).map_err(|e| {
                    RootwatchError::config(format!("Invalid {} for {}: {}", name, chain, e))
                })?;
            }
        }

        if self.tokens.is_empty() {
            return Err(RootwatchError::config("At least one token required"));
        }

        for (token, token_config) in &self.tokens {
            if !token_config.bridges.contains_key(&Chain::ROOT) {
                return Err(RootwatchError::config(format!(
                    "{} has no bridge on the root chain",
                    token
                )));
            }

            for chain in token_config.bridges.keys() {
                if !self.chains.contains_key(chain) {
                    return Err(RootwatchError::config(format!(
                        "{} is deployed on {} but {} has no chain config",
                        token, chain, chain
                    )));
                }
            }
        }

        if self.gateway.max_send_attempts == 0 {
            return Err(RootwatchError::config("Max send attempts must be > 0"));
        }

        if self.indexer.request_timeout_ms == 0 {
            return Err(RootwatchError::config("Indexer request timeout must be > 0"));
        }

        Ok(())
    }

    pub fn chain(&self, chain: Chain) -> Result<&ChainConfig> {
        self.chains
            .get(&chain)
            .ok_or_else(|| RootwatchError::config(format!("Chain {} not configured", chain)))
    }

    pub fn token(&self, token: Token) -> Result<&TokenConfig> {
        self.tokens
            .get(&token)
            .ok_or_else(|| RootwatchError::config(format!("Token {} not configured", token)))
    }

    /// Reject chain/token combinations with no bridge deployment
    pub fn ensure_pair(&self, chain: Chain, token: Token) -> Result<()> {
        self.bridge_address(chain, token).map(|_| ())
    }

    pub fn bridge_address(&self, chain: Chain, token: Token) -> Result<Address> {
        self.token(token)?
            .bridges
            .get(&chain)
            .copied()
            .ok_or_else(|| {
                RootwatchError::config(format!("{} has no bridge on {}", token, chain))
            })
    }

    /// Chains a token is deployed on, root chain included
    pub fn token_chains(&self, token: Token) -> Vec<Chain> {
        self.tokens
            .get(&token)
            .map(|t| t.bridges.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every (source chain, token) pair the watchers run for. The root chain is
    /// never a commit source.
    pub fn source_pairs(&self) -> Vec<(Chain, Token)> {
        self.tokens
            .iter()
            .flat_map(|(token, t)| {
                t.bridges
                    .keys()
                    .filter(|chain| !chain.is_root())
                    .map(move |chain| (*chain, *token))
            })
            .collect()
    }

    pub fn has_signer(&self) -> bool {
        self.gateway.private_key.is_some()
    }

    pub fn commit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.commit.poll_interval_ms)
    }

    pub fn max_commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit.max_commit_interval_secs)
    }

    pub fn bond_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bond.poll_interval_ms)
    }

    pub fn bond_staleness_cutoff(&self) -> Duration {
        Duration::from_secs(self.bond.staleness_cutoff_secs)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay.poll_interval_ms)
    }

    pub fn verifier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.verifier.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier.stall_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.indexer.request_timeout_ms)
    }
}
