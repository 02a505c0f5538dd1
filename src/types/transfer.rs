use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use super::merkle::merkle_root;
use crate::config::Chain;
use crate::indexer::{BondedRecord, CommittedRecord};

pub type TxHash = B256;
pub type RootHash = B256;

/// A committed batch of transfers from one source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRoot {
    pub root_hash: RootHash,
    pub source_chain: Chain,
    pub destination_chain_id: u64,
    pub total_amount: U256,
    pub committed_at: u64,
    pub committed_at_block: u64,
    pub transaction_hash: TxHash,
}

impl TransferRoot {
    pub fn from_record(source_chain: Chain, record: &CommittedRecord) -> Self {
        Self {
            root_hash: record.root_hash,
            source_chain,
            destination_chain_id: record.destination_chain_id,
            total_amount: record.total_amount,
            committed_at: record.committed_at(),
            committed_at_block: record.block_number,
            transaction_hash: record.transaction_hash,
        }
    }

    /// Seconds since commit, zero if the commit is in the future
    pub fn age_seconds(&self, now: u64) -> u64 {
        now.saturating_sub(self.committed_at)
    }
}

/// A bonder's stake against a transfer root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub root_hash: RootHash,
    pub bonder: Option<Address>,
    pub bonded_amount: Option<U256>,
    pub bonded_at_block: u64,
    pub challenged: bool,
}

impl Bond {
    pub fn with_challenged(mut self, challenged: bool) -> Self {
        self.challenged = challenged;
        self
    }
}

impl From<&BondedRecord> for Bond {
    fn from(record: &BondedRecord) -> Self {
        Self {
            root_hash: record.root,
            bonder: record.from,
            bonded_amount: record.amount,
            bonded_at_block: record.block_number,
            challenged: false,
        }
    }
}

/// Uncommitted transfers on a source chain for one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub destination_chain_id: u64,
    pub amount: U256,
    pub transfer_ids: Vec<B256>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_zero() && self.transfer_ids.is_empty()
    }

    /// The root this batch commits to; identical batches share a fingerprint
    pub fn fingerprint(&self) -> RootHash {
        merkle_root(&self.transfer_ids)
    }
}
