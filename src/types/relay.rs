use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::transfer::TxHash;
use crate::config::Chain;

/// Delivery status of a cross-domain message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Pending,
    Redeemable,
    Relayed,
    Failed,
}

impl RelayStatus {
    /// Whether an operator-requested relay should be sent for this message
    pub fn needs_relay(&self) -> bool {
        matches!(
            self,
            RelayStatus::Pending | RelayStatus::Redeemable | RelayStatus::Failed
        )
    }

    /// Whether the polling relayer may resend this message unprompted.
    /// Failed messages are left to an operator.
    pub fn needs_auto_relay(&self) -> bool {
        matches!(self, RelayStatus::Pending | RelayStatus::Redeemable)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayStatus::Relayed)
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayStatus::Pending => "pending",
            RelayStatus::Redeemable => "redeemable",
            RelayStatus::Relayed => "relayed",
            RelayStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A cross-domain message emitted by an origin transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Chain the message is delivered to
    pub chain: Chain,
    pub origin_tx_hash: TxHash,
    pub message_index: u32,
    /// Chain-specific message identifier (ticket id for retryables)
    pub message_id: B256,
    pub status: RelayStatus,
}

impl RelayMessage {
    pub fn new(chain: Chain, origin_tx_hash: TxHash, message_index: u32, message_id: B256) -> Self {
        Self {
            chain,
            origin_tx_hash,
            message_index,
            message_id,
            status: RelayStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: RelayStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_statuses() {
        assert!(RelayStatus::Pending.needs_relay());
        assert!(RelayStatus::Redeemable.needs_relay());
        assert!(RelayStatus::Failed.needs_relay());
        assert!(!RelayStatus::Relayed.needs_relay());
        assert!(RelayStatus::Redeemable.needs_auto_relay());
        assert!(!RelayStatus::Failed.needs_auto_relay());
        assert!(RelayStatus::Relayed.is_terminal());
        assert!(!RelayStatus::Failed.is_terminal());
    }

    #[test]
    fn test_message_builder() {
        let msg = RelayMessage::new(Chain::Arbitrum, B256::repeat_byte(1), 2, B256::repeat_byte(9))
            .with_status(RelayStatus::Redeemable);
        assert_eq!(msg.message_index, 2);
        assert_eq!(msg.status, RelayStatus::Redeemable);
    }
}
