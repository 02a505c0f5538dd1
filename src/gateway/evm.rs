use alloy::network::EthereumWallet;
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Display;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::contracts::IArbRetryableTx::RedeemScheduled;
use super::contracts::{IArbRetryableTx, IBridge, InboxMessageDelivered, ARB_RETRYABLE_TX};
use super::{ChainCallError, ContractGateway, ContractOp, GasEstimate};
use crate::config::{Chain, Config, Token};
use crate::error::{Result, RootwatchError};
use crate::types::{PendingBatch, RelayMessage, RelayStatus, TxHash};

/// Upper bound on pending transfer ids read per destination
const MAX_PENDING_TRANSFERS: u64 = 512;

/// Contract gateway over EVM JSON-RPC endpoints
pub struct EvmGateway {
    providers: BTreeMap<Chain, DynProvider>,
    bridges: BTreeMap<(Chain, Token), Address>,
    bonder: Option<Address>,
    // One lock per chain: a single signer shares its nonce sequence per chain
    send_locks: BTreeMap<Chain, Mutex<()>>,
    max_send_attempts: u32,
    gas_bump_percent: u64,
}

impl EvmGateway {
    pub fn from_config(config: &Config) -> Result<Self> {
        let signer = match &config.gateway.private_key {
            Some(key) => Some(key.trim().parse::<PrivateKeySigner>().map_err(|e| {
                RootwatchError::config(format!("Invalid signer key: {}", e))
            })?),
            None => None,
        };
        let bonder = signer.as_ref().map(|s| s.address());
        let wallet = signer.map(EthereumWallet::from);

        let mut providers = BTreeMap::new();
        let mut send_locks = BTreeMap::new();
        for (chain, chain_config) in &config.chains {
            let url: reqwest::Url = chain_config.rpc_url.parse().map_err(|e| {
                RootwatchError::config(format!("Invalid RPC URL for {}: {}", chain, e))
            })?;

            let provider = match &wallet {
                Some(wallet) => ProviderBuilder::new()
                    .wallet(wallet.clone())
                    .connect_http(url)
                    .erased(),
                None => ProviderBuilder::new().connect_http(url).erased(),
            };

            providers.insert(*chain, provider);
            send_locks.insert(*chain, Mutex::new(()));
        }

        let bridges = config
            .tokens
            .iter()
            .flat_map(|(token, t)| {
                t.bridges
                    .iter()
                    .map(move |(chain, address)| ((*chain, *token), *address))
            })
            .collect();

        match bonder {
            Some(address) => info!("🔑 Gateway signer: {}", address),
            None => warn!("No signer configured - gateway is read-only"),
        }

        Ok(Self {
            providers,
            bridges,
            bonder,
            send_locks,
            max_send_attempts: config.gateway.max_send_attempts,
            gas_bump_percent: config.gateway.gas_bump_percent,
        })
    }

    pub fn bonder(&self) -> Option<Address> {
        self.bonder
    }

    fn provider(&self, chain: Chain) -> std::result::Result<&DynProvider, ChainCallError> {
        self.providers
            .get(&chain)
            .ok_or_else(|| ChainCallError::unsupported(format!("no RPC configured for {}", chain)))
    }

    fn bridge(&self, chain: Chain, token: Token) -> std::result::Result<Address, ChainCallError> {
        self.bridges
            .get(&(chain, token))
            .copied()
            .ok_or_else(|| ChainCallError::unsupported(format!("{} has no bridge on {}", token, chain)))
    }

    fn require_bonder(&self) -> std::result::Result<Address, ChainCallError> {
        self.bonder.ok_or(ChainCallError::NoSigner)
    }

    /// Status of one retryable ticket on its rollup. The ticket id doubles as
    /// the hash of the L2 transaction that created it.
    async fn read_ticket_status(
        &self,
        provider: &DynProvider,
        ticket_id: B256,
    ) -> std::result::Result<RelayStatus, ChainCallError> {
        let Some(creation) = provider
            .get_transaction_receipt(ticket_id)
            .await
            .map_err(chain_error)?
        else {
            return Ok(ticket_status(false, false, false));
        };

        let retryables = IArbRetryableTx::new(ARB_RETRYABLE_TX, provider.clone());
        let live = match retryables.getTimeout(ticket_id).call().await.map_err(chain_error) {
            Ok(_) => true,
            // Redeemed and expired tickets are both deleted
            Err(ChainCallError::Reverted { .. }) => false,
            Err(e) => return Err(e),
        };

        let redeemed = !live
            && self
                .redeem_succeeded(provider, ticket_id, creation.block_number.unwrap_or_default())
                .await?;

        Ok(ticket_status(true, live, redeemed))
    }

    /// Whether any scheduled redeem of `ticket_id` executed successfully
    async fn redeem_succeeded(
        &self,
        provider: &DynProvider,
        ticket_id: B256,
        from_block: u64,
    ) -> std::result::Result<bool, ChainCallError> {
        let filter = Filter::new()
            .address(ARB_RETRYABLE_TX)
            .event_signature(RedeemScheduled::SIGNATURE_HASH)
            .topic1(ticket_id)
            .from_block(from_block);

        let logs = provider.get_logs(&filter).await.map_err(chain_error)?;
        for retry_tx_hash in logs.iter().filter_map(|log| log.topics().get(2).copied()) {
            let receipt = provider
                .get_transaction_receipt(retry_tx_hash)
                .await
                .map_err(chain_error)?;
            if receipt.is_some_and(|r| r.status()) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Retryable ticket ids of the L1→L2 messages in `origin_tx_hash`
    async fn ticket_ids(
        &self,
        chain: Chain,
        origin_tx_hash: TxHash,
    ) -> std::result::Result<Vec<B256>, ChainCallError> {
        if !chain.uses_retryable_tickets() {
            return Err(ChainCallError::unsupported(format!(
                "{} does not use redeemable L1→L2 messages",
                chain
            )));
        }

        let receipt = self
            .provider(Chain::ROOT)?
            .get_transaction_receipt(origin_tx_hash)
            .await
            .map_err(chain_error)?
            .ok_or_else(|| ChainCallError::Rpc(format!("receipt for {} not found", origin_tx_hash)))?;

        let chain_id = U256::from(chain.chain_id()).to_be_bytes::<32>();
        let ids = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.topics().first() == Some(&InboxMessageDelivered::SIGNATURE_HASH))
            .filter_map(|log| log.topics().get(1).copied())
            .map(|message_num| {
                let mut preimage = [0u8; 64];
                preimage[..32].copy_from_slice(&chain_id);
                preimage[32..].copy_from_slice(message_num.as_slice());
                keccak256(preimage)
            })
            .collect();

        Ok(ids)
    }

    async fn ticket_id(
        &self,
        chain: Chain,
        origin_tx_hash: TxHash,
        message_index: u32,
    ) -> std::result::Result<B256, ChainCallError> {
        self.ticket_ids(chain, origin_tx_hash)
            .await?
            .get(message_index as usize)
            .copied()
            .ok_or(ChainCallError::MessageNotFound {
                index: message_index,
            })
    }

    async fn estimate_limit(&self, op: &ContractOp) -> std::result::Result<u64, ChainCallError> {
        let provider = self.provider(op.chain())?.clone();
        let from = self.bonder.unwrap_or_default();

        let limit = match op {
            ContractOp::Commit {
                source_chain,
                token,
                destination_chain_id,
            } => {
                IBridge::new(self.bridge(*source_chain, *token)?, provider)
                    .commitTransfers(U256::from(*destination_chain_id))
                    .from(from)
                    .estimate_gas()
                    .await
            }
            ContractOp::Bond {
                token,
                root_hash,
                destination_chain_id,
                amount,
            } => {
                IBridge::new(self.bridge(Chain::ROOT, *token)?, provider)
                    .bondTransferRoot(*root_hash, U256::from(*destination_chain_id), *amount)
                    .from(from)
                    .estimate_gas()
                    .await
            }
            ContractOp::Relay {
                chain,
                origin_tx_hash,
                message_index,
            } => {
                let ticket_id = self.ticket_id(*chain, *origin_tx_hash, *message_index).await?;
                IArbRetryableTx::new(ARB_RETRYABLE_TX, provider)
                    .redeem(ticket_id)
                    .from(from)
                    .estimate_gas()
                    .await
            }
        };

        limit.map_err(chain_error)
    }

    async fn send_once(
        &self,
        op: &ContractOp,
        gas: GasEstimate,
    ) -> std::result::Result<TxHash, ChainCallError> {
        let provider = self.provider(op.chain())?.clone();

        let pending = match op {
            ContractOp::Commit {
                source_chain,
                token,
                destination_chain_id,
            } => {
                IBridge::new(self.bridge(*source_chain, *token)?, provider)
                    .commitTransfers(U256::from(*destination_chain_id))
                    .gas(gas.gas_limit)
                    .max_fee_per_gas(gas.max_fee_per_gas)
                    .max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
                    .send()
                    .await
            }
            ContractOp::Bond {
                token,
                root_hash,
                destination_chain_id,
                amount,
            } => {
                IBridge::new(self.bridge(Chain::ROOT, *token)?, provider)
                    .bondTransferRoot(*root_hash, U256::from(*destination_chain_id), *amount)
                    .gas(gas.gas_limit)
                    .max_fee_per_gas(gas.max_fee_per_gas)
                    .max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
                    .send()
                    .await
            }
            ContractOp::Relay {
                chain,
                origin_tx_hash,
                message_index,
            } => {
                let ticket_id = self.ticket_id(*chain, *origin_tx_hash, *message_index).await?;
                IArbRetryableTx::new(ARB_RETRYABLE_TX, provider)
                    .redeem(ticket_id)
                    .gas(gas.gas_limit)
                    .max_fee_per_gas(gas.max_fee_per_gas)
                    .max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
                    .send()
                    .await
            }
        }
        .map_err(chain_error)?;

        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl ContractGateway for EvmGateway {
    async fn submit(&self, op: ContractOp) -> std::result::Result<TxHash, ChainCallError> {
        self.require_bonder()?;

        let chain = op.chain();
        let lock = self
            .send_locks
            .get(&chain)
            .ok_or_else(|| ChainCallError::unsupported(format!("no RPC configured for {}", chain)))?;
        let _guard = lock.lock().await;

        let mut attempt = 1;
        loop {
            // Re-estimated every attempt so a retry never reuses stale fees
            let gas = self
                .estimate_gas(&op)
                .await?
                .bumped(self.gas_bump_percent * u64::from(attempt - 1));

            match self.send_once(&op, gas).await {
                Ok(tx_hash) => {
                    info!("📤 Sent {} in {}", op, tx_hash);
                    return Ok(tx_hash);
                }
                Err(e) if e.is_retryable() && attempt < self.max_send_attempts => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        op, attempt, self.max_send_attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn estimate_gas(&self, op: &ContractOp) -> std::result::Result<GasEstimate, ChainCallError> {
        let gas_limit = self.estimate_limit(op).await?;
        let fees = self
            .provider(op.chain())?
            .estimate_eip1559_fees()
            .await
            .map_err(chain_error)?;

        debug!("Gas estimate for {}: {} units", op, gas_limit);

        Ok(GasEstimate {
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn pending_batch(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> std::result::Result<PendingBatch, ChainCallError> {
        let bridge = IBridge::new(
            self.bridge(source_chain, token)?,
            self.provider(source_chain)?.clone(),
        );
        let destination = U256::from(destination_chain_id);

        let amount = bridge
            .pendingAmountForChainId(destination)
            .call()
            .await
            .map_err(chain_error)?;

        // The pending id array has no length getter; reading past its end reverts
        let mut transfer_ids = Vec::new();
        for index in 0..MAX_PENDING_TRANSFERS {
            match bridge
                .pendingTransferIdsForChainId(destination, U256::from(index))
                .call()
                .await
                .map_err(chain_error)
            {
                Ok(id) => transfer_ids.push(id),
                Err(ChainCallError::Reverted { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(PendingBatch {
            destination_chain_id,
            amount,
            transfer_ids,
        })
    }

    async fn last_commit_time(
        &self,
        source_chain: Chain,
        token: Token,
        destination_chain_id: u64,
    ) -> std::result::Result<u64, ChainCallError> {
        let time = IBridge::new(
            self.bridge(source_chain, token)?,
            self.provider(source_chain)?.clone(),
        )
        .lastCommitTimeForChainId(U256::from(destination_chain_id))
        .call()
        .await
        .map_err(chain_error)?;

        Ok(time.saturating_to::<u64>())
    }

    async fn available_liquidity(
        &self,
        chain: Chain,
        token: Token,
    ) -> std::result::Result<U256, ChainCallError> {
        let bonder = self.require_bonder()?;
        let bridge = IBridge::new(self.bridge(chain, token)?, self.provider(chain)?.clone());

        let credit = bridge.getCredit(bonder).call().await.map_err(chain_error)?;
        let debit = bridge
            .getDebitAndAdditionalDebit(bonder)
            .call()
            .await
            .map_err(chain_error)?;

        Ok(credit.saturating_sub(debit))
    }

    async fn relay_messages(
        &self,
        chain: Chain,
        origin_tx_hash: TxHash,
    ) -> std::result::Result<Vec<RelayMessage>, ChainCallError> {
        let provider = self.provider(chain)?;
        let mut messages = Vec::new();

        for (index, ticket_id) in self.ticket_ids(chain, origin_tx_hash).await?.into_iter().enumerate() {
            let status = self.read_ticket_status(provider, ticket_id).await?;
            debug!("Ticket {} on {} is {}", ticket_id, chain, status);

            messages.push(
                RelayMessage::new(chain, origin_tx_hash, index as u32, ticket_id).with_status(status),
            );
        }

        Ok(messages)
    }
}

/// Classify a retryable ticket: not yet created on L2 is pending, a live
/// ticket is redeemable, a deleted one is relayed if a redeem succeeded and
/// failed (expired) otherwise
fn ticket_status(created: bool, live: bool, redeemed: bool) -> RelayStatus {
    match (created, live, redeemed) {
        (false, _, _) => RelayStatus::Pending,
        (true, true, _) => RelayStatus::Redeemable,
        (true, false, true) => RelayStatus::Relayed,
        (true, false, false) => RelayStatus::Failed,
    }
}

fn chain_error<E: Display>(e: E) -> ChainCallError {
    ChainCallError::classify(&e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TEST_CONFIG;

    fn gateway() -> EvmGateway {
        let mut config = Config::from_toml_str(TEST_CONFIG).unwrap();
        config.gateway.private_key = None;
        EvmGateway::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_writes_require_signer() {
        let gateway = gateway();
        assert!(gateway.bonder().is_none());

        let err = gateway
            .commit(Chain::Optimism, Token::Usdc, 1)
            .await
            .unwrap_err();
        assert_eq!(err, ChainCallError::NoSigner);

        let err = gateway
            .available_liquidity(Chain::Ethereum, Token::Usdc)
            .await
            .unwrap_err();
        assert_eq!(err, ChainCallError::NoSigner);
    }

    #[test]
    fn test_ticket_status() {
        assert_eq!(ticket_status(false, false, false), RelayStatus::Pending);
        assert_eq!(ticket_status(true, true, false), RelayStatus::Redeemable);
        assert_eq!(ticket_status(true, false, true), RelayStatus::Relayed);
        // Deleted without a successful redeem: expired
        assert_eq!(ticket_status(true, false, false), RelayStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_bridge_is_unsupported() {
        let gateway = gateway();
        let err = gateway
            .pending_batch(Chain::Arbitrum, Token::Usdc, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainCallError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_optimism_has_no_redeemable_messages() {
        let gateway = gateway();
        let err = gateway
            .relay_messages(Chain::Optimism, B256::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainCallError::Unsupported(_)));
    }

    #[test]
    fn test_signer_key_parsed() {
        let mut config = Config::from_toml_str(TEST_CONFIG).unwrap();
        // Well-known development key
        config.gateway.private_key =
            Some("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string());

        let gateway = EvmGateway::from_config(&config).unwrap();
        assert_eq!(
            gateway.bonder(),
            Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap())
        );
    }

    #[test]
    fn test_bad_signer_key_rejected() {
        let mut config = Config::from_toml_str(TEST_CONFIG).unwrap();
        config.gateway.private_key = Some("not-a-key".to_string());
        assert!(EvmGateway::from_config(&config).is_err());
    }
}
