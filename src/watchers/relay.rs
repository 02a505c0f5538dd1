use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::PollingWatcher;
use crate::config::{Chain, Config, Token};
use crate::error::{Result, RootwatchError};
use crate::gateway::{ChainCallError, ContractGateway};
use crate::indexer::{EventSource, IndexedRecord, INITIAL_CURSOR};
use crate::types::{RelayStatus, TxHash};

/// A validated operator request to relay L1→L2 messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub chain: Chain,
    pub token: Token,
    pub tx_hashes: Vec<TxHash>,
    pub message_index: Option<u32>,
}

impl RelayRequest {
    pub fn new(
        chain: Option<Chain>,
        token: Option<Token>,
        tx_hashes: Vec<TxHash>,
        message_index: Option<u32>,
    ) -> Result<Self> {
        let chain = chain.ok_or_else(|| RootwatchError::validation("Chain not found"))?;
        let token = token.ok_or_else(|| RootwatchError::validation("Token not found"))?;

        if tx_hashes.is_empty() {
            return Err(RootwatchError::validation("Tx hash not found"));
        }

        if message_index.is_some() && tx_hashes.len() > 1 {
            return Err(RootwatchError::validation(
                "Cannot specify message index when retrying multiple tx hashes",
            ));
        }

        Ok(Self {
            chain,
            token,
            tx_hashes,
            message_index,
        })
    }
}

/// Result of relaying one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    Relayed { tx_hash: TxHash },
    /// Dry run: the message needs relaying
    WouldRelay,
    AlreadyRelayed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayReport {
    pub relayed: Vec<(TxHash, RelayOutcome)>,
    pub failures: Vec<(TxHash, String)>,
}

impl RelayReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: RelayReport) {
        self.relayed.extend(other.relayed);
        self.failures.extend(other.failures);
    }
}

/// Relays stuck L1→L2 messages for one destination chain and token
pub struct RelayWatcher {
    chain: Chain,
    token: Token,
    dry_run: bool,
    gateway: Arc<dyn ContractGateway>,
    events: Arc<dyn EventSource>,
    cursor: Mutex<String>,
}

impl RelayWatcher {
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
            dry_run: false,
            gateway,
            events,
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

    /// Relay message `message_index` of `origin_tx_hash` unless already relayed
    pub async fn send_relay_tx(&self, origin_tx_hash: TxHash, message_index: u32) -> Result<RelayOutcome> {
        let messages = self
            .gateway
            .relay_messages(self.chain, origin_tx_hash)
            .await?;

        let message = messages
            .get(message_index as usize)
            .ok_or(ChainCallError::MessageNotFound {
                index: message_index,
            })?;

        if !message.status.needs_relay() {
            debug!(
                "{}#{} on {} is {}",
                origin_tx_hash, message_index, self.chain, message.status
            );
            return Ok(RelayOutcome::AlreadyRelayed);
        }

        if self.dry_run {
            info!(
                "[dry] Would relay {}#{} to {} ({})",
                origin_tx_hash, message_index, self.chain, message.status
            );
            return Ok(RelayOutcome::WouldRelay);
        }

        match self
            .gateway
            .relay(self.chain, origin_tx_hash, message_index)
            .await
        {
            Ok(tx_hash) => {
                info!(
                    "✅ Relayed {}#{} to {}: {}",
                    origin_tx_hash, message_index, self.chain, tx_hash
                );
                Ok(RelayOutcome::Relayed { tx_hash })
            }
            Err(e) if e.is_benign_race() => Ok(RelayOutcome::AlreadyRelayed),
            Err(e) => Err(e.into()),
        }
    }

    /// Relay every transaction in `request`, one at a time. A failed relay is
    /// recorded and the rest still run.
    pub async fn relay_all(&self, request: &RelayRequest) -> RelayReport {
        let message_index = request.message_index.unwrap_or(0);
        let mut report = RelayReport::default();

        for tx_hash in &request.tx_hashes {
            match self.send_relay_tx(*tx_hash, message_index).await {
                Ok(outcome) => report.relayed.push((*tx_hash, outcome)),
                Err(e) => {
                    warn!("Relay of {} to {} failed: {}", tx_hash, self.chain, e);
                    report.failures.push((*tx_hash, e.to_string()));
                }
            }
        }

        report
    }

    /// Relay every pending or redeemable message of `origin_tx_hash`. Failed
    /// relays are logged and reported; the remaining messages still run.
    async fn relay_stuck(&self, origin_tx_hash: TxHash) -> RelayReport {
        let mut report = RelayReport::default();

        let messages = match self.gateway.relay_messages(self.chain, origin_tx_hash).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Reading messages of {} for {} failed: {}", origin_tx_hash, self.chain, e);
                report.failures.push((origin_tx_hash, e.to_string()));
                return report;
            }
        };

        for message in &messages {
            if message.status == RelayStatus::Failed {
                warn!(
                    "⚠️ {}#{} on {} failed; relay it manually",
                    origin_tx_hash, message.message_index, self.chain
                );
                continue;
            }
            if !message.status.needs_auto_relay() {
                continue;
            }

            match self.send_relay_tx(origin_tx_hash, message.message_index).await {
                Ok(outcome) => report.relayed.push((origin_tx_hash, outcome)),
                Err(e) => {
                    warn!(
                        "Relay of {}#{} to {} failed: {}",
                        origin_tx_hash, message.message_index, self.chain, e
                    );
                    report.failures.push((origin_tx_hash, e.to_string()));
                }
            }
        }

        report
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, String> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PollingWatcher for RelayWatcher {
    fn label(&self) -> String {
        format!("relay:{}:{}", self.chain, self.token)
    }

    /// Scan new root-chain confirmations bound for this chain. The cursor moves
    /// past every confirmation handled; failed relays are logged and left to
    /// the operator command.
    async fn poll(&self) -> Result<()> {
        if !self.chain.uses_retryable_tickets() {
            return Ok(());
        }

        let since = self.lock_cursor().clone();
        let confirmed = self
            .events
            .transfer_roots_confirmed(Chain::ROOT, self.token, &since)
            .await?;

        let mut report = RelayReport::default();
        for record in &confirmed {
            if record.destination_chain_id == Some(self.chain.chain_id()) {
                report.merge(self.relay_stuck(record.transaction_hash).await);
            }
            *self.lock_cursor() = record.id().to_string();
        }

        if !report.relayed.is_empty() {
            info!("{}: handled {} messages", self.label(), report.relayed.len());
        }
        if !report.is_success() {
            warn!(
                "{}: {} relays failed this cycle",
                self.label(),
                report.failures.len()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ContractOp;
    use crate::testing::{confirmed_record, hash, FakeGateway, StaticEventSource, TEST_CONFIG};
    use crate::types::RelayMessage;

    fn setup() -> (RelayWatcher, Arc<FakeGateway>, Arc<StaticEventSource>) {
        let config = Config::from_toml_str(TEST_CONFIG).unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let events = Arc::new(StaticEventSource::new());
        let watcher = RelayWatcher::new(
            Chain::Arbitrum,
            Token::Eth,
            &config,
            gateway.clone(),
            events.clone(),
        )
        .unwrap();
        (watcher, gateway, events)
    }

    fn message(origin: TxHash, index: u32, status: RelayStatus) -> RelayMessage {
        RelayMessage::new(Chain::Arbitrum, origin, index, hash(500 + index as u64)).with_status(status)
    }

    #[test]
    fn test_request_validation() {
        let tx = vec![hash(1)];

        let err = RelayRequest::new(None, Some(Token::Eth), tx.clone(), None).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Chain not found");

        let err = RelayRequest::new(Some(Chain::Arbitrum), None, tx.clone(), None).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Token not found");

        let err = RelayRequest::new(Some(Chain::Arbitrum), Some(Token::Eth), vec![], None).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Tx hash not found");

        let err = RelayRequest::new(
            Some(Chain::Arbitrum),
            Some(Token::Eth),
            vec![hash(1), hash(2)],
            Some(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot specify message index"));

        assert!(RelayRequest::new(Some(Chain::Arbitrum), Some(Token::Eth), tx, Some(2)).is_ok());
    }

    #[tokio::test]
    async fn test_relays_redeemable_message() {
        let (watcher, gateway, _) = setup();
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Redeemable)]);

        let outcome = watcher.send_relay_tx(hash(1), 0).await.unwrap();
        assert!(matches!(outcome, RelayOutcome::Relayed { .. }));
        assert_eq!(
            gateway.submitted(),
            vec![ContractOp::Relay {
                chain: Chain::Arbitrum,
                origin_tx_hash: hash(1),
                message_index: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_relayed_message_is_noop() {
        let (watcher, gateway, _) = setup();
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Relayed)]);

        let outcome = watcher.send_relay_tx(hash(1), 0).await.unwrap();
        assert_eq!(outcome, RelayOutcome::AlreadyRelayed);
        assert!(gateway.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_index() {
        let (watcher, gateway, _) = setup();
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Failed)]);

        let err = watcher.send_relay_tx(hash(1), 3).await.unwrap_err();
        assert!(matches!(
            err,
            RootwatchError::ChainCall(ChainCallError::MessageNotFound { index: 3 })
        ));
    }

    #[tokio::test]
    async fn test_relay_all_collects_failures() {
        let (watcher, gateway, _) = setup();
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Redeemable)]);
        gateway.set_messages(hash(3), vec![message(hash(3), 0, RelayStatus::Pending)]);

        let request = RelayRequest::new(
            Some(Chain::Arbitrum),
            Some(Token::Eth),
            vec![hash(1), hash(2), hash(3)],
            None,
        )
        .unwrap();

        let report = watcher.relay_all(&request).await;
        assert!(!report.is_success());
        assert_eq!(report.relayed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, hash(2));

        // Sequential, in request order
        let origins: Vec<TxHash> = gateway
            .submitted()
            .into_iter()
            .filter_map(|op| match op {
                ContractOp::Relay { origin_tx_hash, .. } => Some(origin_tx_hash),
                _ => None,
            })
            .collect();
        assert_eq!(origins, vec![hash(1), hash(3)]);
    }

    #[tokio::test]
    async fn test_poll_relays_confirmations_for_this_chain() {
        let (watcher, gateway, events) = setup();
        let arbitrum = confirmed_record(1, Chain::Arbitrum.chain_id());
        let optimism = confirmed_record(2, Chain::Optimism.chain_id());
        gateway.set_messages(
            arbitrum.transaction_hash,
            vec![
                message(arbitrum.transaction_hash, 0, RelayStatus::Relayed),
                message(arbitrum.transaction_hash, 1, RelayStatus::Redeemable),
            ],
        );
        gateway.set_messages(
            optimism.transaction_hash,
            vec![message(optimism.transaction_hash, 0, RelayStatus::Redeemable)],
        );
        events.add_confirmed(arbitrum.clone());
        events.add_confirmed(optimism);

        watcher.poll().await.unwrap();
        assert_eq!(
            gateway.submitted(),
            vec![ContractOp::Relay {
                chain: Chain::Arbitrum,
                origin_tx_hash: arbitrum.transaction_hash,
                message_index: 1,
            }]
        );

        // Cursor moved past both records
        watcher.poll().await.unwrap();
        assert_eq!(gateway.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_continues_past_failing_relays() {
        let (watcher, gateway, events) = setup();
        let expired = confirmed_record(1, Chain::Arbitrum.chain_id());
        let reverting = confirmed_record(2, Chain::Arbitrum.chain_id());
        let stuck = confirmed_record(3, Chain::Arbitrum.chain_id());

        gateway.set_messages(
            expired.transaction_hash,
            vec![message(expired.transaction_hash, 0, RelayStatus::Failed)],
        );
        gateway.set_messages(
            reverting.transaction_hash,
            vec![message(reverting.transaction_hash, 0, RelayStatus::Redeemable)],
        );
        gateway.set_messages(
            stuck.transaction_hash,
            vec![message(stuck.transaction_hash, 0, RelayStatus::Redeemable)],
        );
        gateway.respond_with(Err(ChainCallError::reverted(
            "execution reverted: RETRYABLE_EXPIRED",
        )));
        events.add_confirmed(expired.clone());
        events.add_confirmed(reverting.clone());
        events.add_confirmed(stuck.clone());

        for _ in 0..3 {
            watcher.poll().await.unwrap();
        }

        let origins: Vec<TxHash> = gateway
            .submitted()
            .into_iter()
            .filter_map(|op| match op {
                ContractOp::Relay { origin_tx_hash, .. } => Some(origin_tx_hash),
                _ => None,
            })
            .collect();
        assert_eq!(origins, vec![reverting.transaction_hash, stuck.transaction_hash]);
    }

    #[tokio::test]
    async fn test_operator_relays_failed_message() {
        let (watcher, gateway, _) = setup();
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Failed)]);

        let outcome = watcher.send_relay_tx(hash(1), 0).await.unwrap();
        assert!(matches!(outcome, RelayOutcome::Relayed { .. }));
        assert_eq!(gateway.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_relay() {
        let (watcher, gateway, _) = setup();
        let watcher = watcher.with_dry_run(true);
        gateway.set_messages(hash(1), vec![message(hash(1), 0, RelayStatus::Pending)]);

        let outcome = watcher.send_relay_tx(hash(1), 0).await.unwrap();
        assert_eq!(outcome, RelayOutcome::WouldRelay);
        assert!(gateway.submitted().is_empty());
    }
}
