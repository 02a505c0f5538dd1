use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{
    BondedRecord, ChallengedRecord, CommittedRecord, ConfirmedRecord, EventSource, IndexedRecord,
    IndexerError, PageCursor, QueryKind,
};
use crate::config::{Chain, Config, Token};
use crate::error::{Result, RootwatchError};
use crate::service::backoff::{retry_with_backoff, RetryPolicy};

/// GraphQL client over the hosted subgraphs, one endpoint per chain
pub struct GraphIndexer {
    http: reqwest::Client,
    endpoints: BTreeMap<Chain, String>,
    // Applied per page; without one each page is tried once
    retry: Option<RetryPolicy>,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

impl GraphIndexer {
    pub fn new(endpoints: BTreeMap<Chain, String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RootwatchError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            retry: None,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoints = config
            .chains
            .iter()
            .map(|(chain, c)| (*chain, c.indexer_url.clone()))
            .collect();

        Ok(Self::new(endpoints, config.request_timeout())?
            .with_retry_policy(RetryPolicy::from_config(&config.indexer)))
    }

    fn endpoint(&self, chain: Chain) -> std::result::Result<&str, IndexerError> {
        self.endpoints
            .get(&chain)
            .map(String::as_str)
            .ok_or(IndexerError::UnknownChain(chain))
    }

    /// Fetch the page after `cursor` and advance it, retrying that page alone
    /// on transient failures. Returns `None` once the sequence has ended.
    pub async fn next_page<T>(
        &self,
        kind: QueryKind,
        chain: Chain,
        token: Token,
        cursor: &mut PageCursor,
    ) -> std::result::Result<Option<Vec<T>>, IndexerError>
    where
        T: IndexedRecord + DeserializeOwned,
    {
        if cursor.is_done() {
            return Ok(None);
        }

        let last_id = cursor.last_id();
        let page: Vec<T> = match &self.retry {
            Some(policy) => {
                retry_with_backoff(policy, kind.field(), move || {
                    self.query_page(kind, chain, token, last_id)
                })
                .await?
            }
            None => self.query_page(kind, chain, token, last_id).await?,
        };
        cursor.advance(&page);
        Ok(Some(page))
    }

    /// Fetch every record after `since_id`, concatenated in id order
    pub async fn fetch_all<T>(
        &self,
        kind: QueryKind,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> std::result::Result<Vec<T>, IndexerError>
    where
        T: IndexedRecord + DeserializeOwned,
    {
        let mut cursor = PageCursor::new(since_id);
        let mut records = Vec::new();

        while let Some(page) = self.next_page(kind, chain, token, &mut cursor).await? {
            records.extend(page);
        }

        debug!(
            "{} {} {}: {} records",
            chain,
            token,
            kind.field(),
            records.len()
        );
        Ok(records)
    }

    async fn query_page<T>(
        &self,
        kind: QueryKind,
        chain: Chain,
        token: Token,
        last_id: &str,
    ) -> std::result::Result<Vec<T>, IndexerError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(chain)?;
        let body = json!({
            "query": kind.query(),
            "variables": {
                "token": token.symbol(),
                "lastId": last_id,
            }
        });

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Status(status.as_u16()));
        }

        let response: GraphResponse = response.json().await.map_err(|e| IndexerError::Decode {
            kind: kind.field(),
            reason: e.to_string(),
        })?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(IndexerError::Query(messages.join("; ")));
        }

        let mut data = response.data.ok_or_else(|| IndexerError::Decode {
            kind: kind.field(),
            reason: "missing data".to_string(),
        })?;

        let items = data.remove(kind.field()).unwrap_or(Value::Array(vec![]));
        serde_json::from_value(items).map_err(|e| IndexerError::Decode {
            kind: kind.field(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl EventSource for GraphIndexer {
    async fn transfers_committed(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> std::result::Result<Vec<CommittedRecord>, IndexerError> {
        self.fetch_all(QueryKind::TransfersCommitted, chain, token, since_id)
            .await
    }

    async fn transfer_roots_confirmed(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> std::result::Result<Vec<ConfirmedRecord>, IndexerError> {
        self.fetch_all(QueryKind::TransferRootConfirmed, chain, token, since_id)
            .await
    }

    async fn transfer_roots_bonded(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> std::result::Result<Vec<BondedRecord>, IndexerError> {
        self.fetch_all(QueryKind::TransferRootBonded, chain, token, since_id)
            .await
    }

    async fn transfer_bonds_challenged(
        &self,
        chain: Chain,
        token: Token,
        since_id: &str,
    ) -> std::result::Result<Vec<ChallengedRecord>, IndexerError> {
        self.fetch_all(QueryKind::TransferBondChallenged, chain, token, since_id)
            .await
    }
}
