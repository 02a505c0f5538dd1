use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::types::de;

/// Records returned by a paginated indexer query
pub trait IndexedRecord {
    /// Pagination cursor of this record
    fn id(&self) -> &str;
}

/// `TransfersCommitted` on a source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedRecord {
    pub id: String,
    pub root_hash: B256,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub destination_chain_id: u64,
    #[serde(deserialize_with = "de::u256_from_str")]
    pub total_amount: U256,
    #[serde(default, deserialize_with = "de::opt_u64_from_str")]
    pub root_committed_at: Option<u64>,
    pub transaction_hash: B256,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub timestamp: u64,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub block_number: u64,
}

impl CommittedRecord {
    /// Commit time as recorded by the contract, falling back to the block time
    pub fn committed_at(&self) -> u64 {
        self.root_committed_at.unwrap_or(self.timestamp)
    }
}

/// `TransferRootConfirmed` on the root chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedRecord {
    pub id: String,
    pub root_hash: B256,
    #[serde(default, deserialize_with = "de::opt_u64_from_str")]
    pub origin_chain_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64_from_str")]
    pub destination_chain_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u256_from_str")]
    pub total_amount: Option<U256>,
    pub transaction_hash: B256,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub timestamp: u64,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub block_number: u64,
}

/// `TransferRootBonded` on the root chain. The subgraph names the hash `root`
/// and the bonder `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondedRecord {
    pub id: String,
    pub root: B256,
    #[serde(default, deserialize_with = "de::opt_u256_from_str")]
    pub amount: Option<U256>,
    #[serde(default)]
    pub from: Option<Address>,
    pub transaction_hash: B256,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub timestamp: u64,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub block_number: u64,
}

/// `TransferBondChallenged` on the root chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengedRecord {
    pub id: String,
    pub root_hash: B256,
    #[serde(default, deserialize_with = "de::opt_u256_from_str")]
    pub original_amount: Option<U256>,
    pub transaction_hash: B256,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub timestamp: u64,
    #[serde(deserialize_with = "de::u64_from_str")]
    pub block_number: u64,
}

impl IndexedRecord for CommittedRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl IndexedRecord for ConfirmedRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl IndexedRecord for BondedRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl IndexedRecord for ChallengedRecord {
    fn id(&self) -> &str {
        &self.id
    }
}
