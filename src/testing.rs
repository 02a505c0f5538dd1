//! In-memory collaborators shared by the unit tests.

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{Chain, Token};
use crate::gateway::{ChainCallError, ContractGateway, ContractOp, GasEstimate};
use crate::indexer::{
    BondedRecord, ChallengedRecord, CommittedRecord, ConfirmedRecord, EventSource, IndexedRecord,
    IndexerError,
};
use crate::types::{PendingBatch, RelayMessage, TxHash};

pub const TEST_CONFIG: &str = r#"
[chains.ethereum]
rpc_url = "http://127.0.0.1:8545"
indexer_url = "http://127.0.0.1:8000/subgraphs/name/bridge-mainnet"

[chains.optimism]
rpc_url = "http://127.0.0.1:9545"
indexer_url = "http://127.0.0.1:8000/subgraphs/name/bridge-optimism"

[chains.arbitrum]
rpc_url = "http://127.0.0.1:8547"
indexer_url = "http://127.0.0.1:8000/subgraphs/name/bridge-arbitrum"

[tokens.USDC]
min_commit_threshold = "1000000000"
max_bond_size = "5000000000"

[tokens.USDC.bridges]
ethereum = "0x3666f603cc164936c1b87e207f36beba4ac5f18a"
optimism = "0xa81d244a1814468c734e5b4101f7b9c0c577a8fc"

[tokens.ETH]
min_commit_threshold = "100000000000000000000"
max_bond_size = "1000000000000000000000"

[tokens.ETH.bridges]
ethereum = "0xb8901acb165ed027e32754e0ffe830802919727f"
arbitrum = "0x3749c4f034022c39ecaffaba182555d4508caccc"

[commit]
max_commit_interval_secs = 3600

[bond]
staleness_cutoff_secs = 86400
"#;

pub fn hash(n: u64) -> B256 {
    B256::from(U256::from(n))
}

pub fn record_id(n: u64) -> String {
    format!("0x{:064x}", n)
}

pub fn committed_record(n: u64, destination_chain_id: u64, amount: u64, committed_at: u64) -> CommittedRecord {
    CommittedRecord {
        id: record_id(n),
        root_hash: hash(n),
        destination_chain_id,
        total_amount: U256::from(amount),
        root_committed_at: Some(committed_at),
        transaction_hash: hash(1_000_000 + n),
        timestamp: committed_at,
        block_number: n,
    }
}

pub fn confirmed_record(n: u64, destination_chain_id: u64) -> ConfirmedRecord {
    ConfirmedRecord {
        id: record_id(n),
        root_hash: hash(n),
        origin_chain_id: None,
        destination_chain_id: Some(destination_chain_id),
        total_amount: None,
        transaction_hash: hash(2_000_000 + n),
        timestamp: 0,
        block_number: n,
    }
}

pub fn bonded_record(n: u64) -> BondedRecord {
    BondedRecord {
        id: record_id(n),
        root: hash(n),
        amount: None,
        from: None,
        transaction_hash: hash(3_000_000 + n),
        timestamp: 0,
        block_number: n,
    }
}

pub fn challenged_record(n: u64) -> ChallengedRecord {
    ChallengedRecord {
        id: record_id(n),
        root_hash: hash(n),
        original_amount: None,
        transaction_hash: hash(4_000_000 + n),
        timestamp: 0,
        block_number: n,
    }
}

fn after<T: IndexedRecord + Clone>(records: &[T], since_id: &str) -> Vec<T> {
    records
        .iter()
        .filter(|r| r.id() > since_id)
        .cloned()
        .collect()
}

/// Event source over fixed record sets, keyed by chain
#[derive(Default)]
pub struct StaticEventSource {
    committed: Mutex<HashMap<Chain, Vec<CommittedRecord>>>,
    confirmed: Mutex<HashMap<Chain, Vec<ConfirmedRecord>>>,
    bonded: Mutex<HashMap<Chain, Vec<BondedRecord>>>,
    challenged: Mutex<HashMap<Chain, Vec<ChallengedRecord>>>,
    failures: Mutex<VecDeque<IndexerError>>,
    calls: AtomicUsize,
}

impl StaticEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_committed(&self, chain: Chain, record: CommittedRecord) {
        self.committed.lock().unwrap().entry(chain).or_default().push(record);
    }

    pub fn add_confirmed(&self, record: ConfirmedRecord) {
        self.confirmed.lock().unwrap().entry(Chain::ROOT).or_default().push(record);
    }

    pub fn add_bonded(&self, record: BondedRecord) {
        self.bonded.lock().unwrap().entry(Chain::ROOT).or_default().push(record);
    }

    pub fn add_challenged(&self, record: ChallengedRecord) {
        self.challenged.lock().unwrap().entry(Chain::ROOT).or_default().push(record);
    }

    /// Fail the next query with `error`
    pub fn fail_next(&self, error: IndexerError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), IndexerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn transfers_committed(
        &self,
        chain: Chain,
        _token: Token,
        since_id: &str,
    ) -> Result<Vec<CommittedRecord>, IndexerError> {
        self.begin()?;
        let records = self.committed.lock().unwrap();
        Ok(records.get(&chain).map(|r| after(r, since_id)).unwrap_or_default())
    }

    async fn transfer_roots_confirmed(
        &self,
        chain: Chain,
        _token: Token,
        since_id: &str,
    ) -> Result<Vec<ConfirmedRecord>, IndexerError> {
        self.begin()?;
        let records = self.confirmed.lock().unwrap();
        Ok(records.get(&chain).map(|r| after(r, since_id)).unwrap_or_default())
    }

    async fn transfer_roots_bonded(
        &self,
        chain: Chain,
        _token: Token,
        since_id: &str,
    ) -> Result<Vec<BondedRecord>, IndexerError> {
        self.begin()?;
        let records = self.bonded.lock().unwrap();
        Ok(records.get(&chain).map(|r| after(r, since_id)).unwrap_or_default())
    }

    async fn transfer_bonds_challenged(
        &self,
        chain: Chain,
        _token: Token,
        since_id: &str,
    ) -> Result<Vec<ChallengedRecord>, IndexerError> {
        self.begin()?;
        let records = self.challenged.lock().unwrap();
        Ok(records.get(&chain).map(|r| after(r, since_id)).unwrap_or_default())
    }
}

/// Gateway that records every submission instead of sending it
pub struct FakeGateway {
    submitted: Mutex<Vec<ContractOp>>,
    results: Mutex<VecDeque<Result<TxHash, ChainCallError>>>,
    pending: Mutex<HashMap<(Chain, Token, u64), PendingBatch>>,
    last_commit: Mutex<HashMap<(Chain, Token, u64), u64>>,
    liquidity: Mutex<U256>,
    messages: Mutex<HashMap<TxHash, Vec<RelayMessage>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            pending: Mutex::new(HashMap::new()),
            last_commit: Mutex::new(HashMap::new()),
            liquidity: Mutex::new(U256::MAX),
            messages: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_pending(&self, chain: Chain, token: Token, batch: PendingBatch) {
        self.pending
            .lock()
            .unwrap()
            .insert((chain, token, batch.destination_chain_id), batch);
    }

    pub fn clear_pending(&self, chain: Chain, token: Token, destination_chain_id: u64) {
        self.pending
            .lock()
            .unwrap()
            .remove(&(chain, token, destination_chain_id));
    }

    pub fn set_last_commit(&self, chain: Chain, token: Token, destination_chain_id: u64, at: u64) {
        self.last_commit
            .lock()
            .unwrap()
            .insert((chain, token, destination_chain_id), at);
    }

    pub fn set_liquidity(&self, amount: U256) {
        *self.liquidity.lock().unwrap() = amount;
    }

    pub fn set_messages(&self, origin_tx_hash: TxHash, messages: Vec<RelayMessage>) {
        self.messages.lock().unwrap().insert(origin_tx_hash, messages);
    }

    /// Answer the next submission with `result`
    pub fn respond_with(&self, result: Result<TxHash, ChainCallError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn submitted(&self) -> Vec<ContractOp> {
        self.submitted.lock().unwrap().clone()
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContractGateway for FakeGateway {
    async fn submit(&self, op: ContractOp) -> Result<TxHash, ChainCallError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(op);
        let n = submitted.len() as u64;

        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(hash(9_000_000 + n)))
    }

    async fn estimate_gas(&self, _op: &ContractOp) -> Result<GasEstimate, ChainCallError> {
        Ok(GasEstimate {
            gas_limit: 100_000,
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
        })
    }

    async fn pending_batch(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> Result<PendingBatch, ChainCallError> {
        Ok(self
            .pending
            .lock()
            .unwrap()
            .get(&(source_chain, token, destination_chain_id))
            .cloned()
            .unwrap_or(PendingBatch {
                destination_chain_id,
                amount: U256::ZERO,
                transfer_ids: vec![],
            }))
    }

    async fn last_commit_time(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> Result<u64, ChainCallError> {
        Ok(self
            .last_commit
            .lock()
            .unwrap()
            .get(&(source_chain, token, destination_chain_id))
            .copied()
            .unwrap_or_else(|| chrono::Utc::now().timestamp() as u64))
    }

    async fn available_liquidity(&self, _chain: Chain, _token: Token) -> Result<U256, ChainCallError> {
        Ok(*self.liquidity.lock().unwrap())
    }

    async fn relay_messages(
        &self,
        _chain: Chain,
        origin_tx_hash: TxHash,
    ) -> Result<Vec<RelayMessage>, ChainCallError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&origin_tx_hash)
            .cloned()
            .unwrap_or_default())
    }
}
