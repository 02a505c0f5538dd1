//! Contract-call seam between the watchers and the chains.
//!
//! The gateway never deduplicates: callers re-check indexed and on-chain state
//! before submitting, and treat benign reverts as success.

mod contracts;
mod evm;

pub use evm::EvmGateway;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::config::{Chain, Token};
use crate::types::{PendingBatch, RelayMessage, RootHash, TxHash};

/// Revert reasons that mean another process already did the work
const BENIGN_REVERT_PATTERNS: &[&str] = &[
    "already committed",
    "already been committed",
    "already bonded",
    "already been bonded",
    "already confirmed",
    "already been confirmed",
    "already relayed",
    "already redeemed",
    "must commit at least 1 transfer",
    "no_ticket_with_id",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainCallError {
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("transaction underpriced")]
    Underpriced,

    #[error("transaction timed out")]
    Timeout,

    #[error("insufficient funds for transaction")]
    InsufficientFunds,

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("message {index} not found in origin transaction")]
    MessageNotFound { index: u32 },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("no signer configured")]
    NoSigner,
}

impl ChainCallError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Map a provider or node error message onto the error taxonomy
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if lower.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if lower.contains("underpriced")
            || lower.contains("fee too low")
            || lower.contains("less than block base fee")
        {
            Self::Underpriced
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("deadline has elapsed")
        {
            Self::Timeout
        } else if lower.contains("revert") {
            Self::Reverted {
                reason: message.to_string(),
            }
        } else {
            Self::Rpc(message.to_string())
        }
    }

    /// Underpriced and timed-out sends can go again with fresh gas
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Underpriced | Self::Timeout | Self::Rpc(_))
    }

    /// A revert caused by a concurrent process having met the same obligation
    pub fn is_benign_race(&self) -> bool {
        match self {
            Self::Reverted { reason } => {
                let reason = reason.to_ascii_lowercase();
                BENIGN_REVERT_PATTERNS.iter().any(|p| reason.contains(p))
            }
            _ => false,
        }
    }
}

/// A state-changing contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ContractOp {
    Commit {
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    },
    Bond {
        token: Token,
        root_hash: RootHash,
        destination_chain_id: u64,
        amount: U256,
    },
    Relay {
        chain: Chain,
        origin_tx_hash: TxHash,
        message_index: u32,
    },
}

impl ContractOp {
    /// Chain the transaction is sent on
    pub fn chain(&self) -> Chain {
        match self {
            ContractOp::Commit { source_chain, .. } => *source_chain,
            ContractOp::Bond { .. } => Chain::ROOT,
            ContractOp::Relay { chain, .. } => *chain,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContractOp::Commit { .. } => "commit",
            ContractOp::Bond { .. } => "bond",
            ContractOp::Relay { .. } => "relay",
        }
    }
}

impl fmt::Display for ContractOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractOp::Commit {
                source_chain,
                token,
                destination_chain_id,
            } => write!(f, "commit {} {} -> {}", token, source_chain, destination_chain_id),
            ContractOp::Bond {
                token,
                root_hash,
                amount,
                ..
            } => write!(f, "bond {} root {} amount {}", token, root_hash, amount),
            ContractOp::Relay {
                chain,
                origin_tx_hash,
                message_index,
            } => write!(f, "relay {} {}#{}", chain, origin_tx_hash, message_index),
        }
    }
}

/// Gas limit and EIP-1559 fees for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasEstimate {
    /// Raise limit and fees by `percent`
    pub fn bumped(&self, percent: u64) -> Self {
        let bump_u64 = |v: u64| v.saturating_add(v.saturating_mul(percent) / 100);
        let bump_u128 = |v: u128| v.saturating_add(v.saturating_mul(percent as u128) / 100);

        Self {
            gas_limit: bump_u64(self.gas_limit),
            max_fee_per_gas: bump_u128(self.max_fee_per_gas),
            max_priority_fee_per_gas: bump_u128(self.max_priority_fee_per_gas),
        }
    }

    /// Worst-case cost in wei
    pub fn max_cost(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.max_fee_per_gas)
    }
}

/// Chain-specific contract calls behind one interface
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Submit a transaction; the returned hash is pending until observed mined
    async fn submit(&self, op: ContractOp) -> Result<TxHash, ChainCallError>;

    async fn estimate_gas(&self, op: &ContractOp) -> Result<GasEstimate, ChainCallError>;

    /// Uncommitted transfers on `source_chain` bound for `destination_chain_id`
    async fn pending_batch(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> Result<PendingBatch, ChainCallError>;

    /// Unix time of the last commit for this destination, zero if never
    async fn last_commit_time(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> Result<u64, ChainCallError>;

    /// Bonder credit not yet committed to outstanding bonds
    async fn available_liquidity(&self, chain: Chain, token: Token) -> Result<U256, ChainCallError>;

    /// Cross-domain messages emitted by an origin transaction, in log order
    async fn relay_messages(
        &self,
        chain: Chain,
        origin_tx_hash: TxHash,
    ) -> Result<Vec<RelayMessage>, ChainCallError>;

    async fn commit(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> Result<TxHash, ChainCallError> {
        self.submit(ContractOp::Commit {
            source_chain,
            token,
            destination_chain_id,
        })
        .await
    }

    async fn bond(
        &self,
        token: Token,
        root_hash: RootHash,
        destination_chain_id: u64,
        amount: U256,
    ) -> Result<TxHash, ChainCallError> {
        self.submit(ContractOp::Bond {
            token,
            root_hash,
            destination_chain_id,
            amount,
        })
        .await
    }

    async fn relay(
        &self,
        chain: Chain,
        origin_tx_hash: TxHash,
        message_index: u32,
    ) -> Result<TxHash, ChainCallError> {
        self.submit(ContractOp::Relay {
            chain,
            origin_tx_hash,
            message_index,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_node_errors() {
        assert_eq!(
            ChainCallError::classify("insufficient funds for gas * price + value"),
            ChainCallError::InsufficientFunds
        );
        assert_eq!(
            ChainCallError::classify("replacement transaction underpriced"),
            ChainCallError::Underpriced
        );
        assert_eq!(
            ChainCallError::classify("max fee per gas less than block base fee"),
            ChainCallError::Underpriced
        );
        assert_eq!(
            ChainCallError::classify("request timed out"),
            ChainCallError::Timeout
        );
        assert!(matches!(
            ChainCallError::classify("execution reverted: L1_BRG: TransferRoot has already been bonded"),
            ChainCallError::Reverted { .. }
        ));
        assert!(matches!(
            ChainCallError::classify("connection refused"),
            ChainCallError::Rpc(_)
        ));
    }

    #[test]
    fn test_benign_race_detection() {
        let bonded = ChainCallError::classify(
            "execution reverted: L1_BRG: TransferRoot has already been bonded",
        );
        assert!(bonded.is_benign_race());
        assert!(!bonded.is_retryable());

        let nothing_pending =
            ChainCallError::reverted("execution reverted: L2_BRG: Must commit at least 1 Transfer");
        assert!(nothing_pending.is_benign_race());

        let other = ChainCallError::reverted("execution reverted: BRG: Invalid amount");
        assert!(!other.is_benign_race());
        assert!(!ChainCallError::InsufficientFunds.is_benign_race());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ChainCallError::Underpriced.is_retryable());
        assert!(ChainCallError::Timeout.is_retryable());
        assert!(!ChainCallError::InsufficientFunds.is_retryable());
        assert!(!ChainCallError::reverted("nope").is_retryable());
    }

    #[test]
    fn test_gas_bump() {
        let estimate = GasEstimate {
            gas_limit: 100_000,
            max_fee_per_gas: 50,
            max_priority_fee_per_gas: 2,
        };

        let bumped = estimate.bumped(20);
        assert_eq!(bumped.gas_limit, 120_000);
        assert_eq!(bumped.max_fee_per_gas, 60);
        assert_eq!(bumped.max_priority_fee_per_gas, 2);
        assert_eq!(estimate.max_cost(), U256::from(5_000_000u64));
    }

    #[test]
    fn test_op_chain_routing() {
        let bond = ContractOp::Bond {
            token: Token::Usdc,
            root_hash: RootHash::ZERO,
            destination_chain_id: 10,
            amount: U256::from(1u64),
        };
        assert_eq!(bond.chain(), Chain::Ethereum);

        let commit = ContractOp::Commit {
            source_chain: Chain::Optimism,
            token: Token::Usdc,
            destination_chain_id: 1,
        };
        assert_eq!(commit.chain(), Chain::Optimism);
        assert_eq!(commit.name(), "commit");
    }
}
