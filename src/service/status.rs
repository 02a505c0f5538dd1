use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Last known outcome of a watcher's poll cycles
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatcherStatus {
    pub cycles: u64,
    pub failures: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl WatcherStatus {
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }
}

/// Shared record of every watcher's cycles, read by the status API
pub struct StatusBoard {
    statuses: Arc<RwLock<BTreeMap<String, WatcherStatus>>>,
    started_at: DateTime<Utc>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(BTreeMap::new())),
            started_at: Utc::now(),
        }
    }

    pub async fn register(&self, label: &str) {
        self.statuses
            .write()
            .await
            .entry(label.to_string())
            .or_default();
    }

    pub async fn record_success(&self, label: &str) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(label.to_string()).or_default();

        if status.last_error.take().is_some() {
            info!("{} recovered", label);
        }
        status.cycles += 1;
        status.last_cycle_at = Some(Utc::now());
    }

    pub async fn record_failure(&self, label: &str, error: &str) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(label.to_string()).or_default();

        if status.last_error.is_none() {
            warn!("{} is failing: {}", label, error);
        }
        status.cycles += 1;
        status.failures += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_error = Some(error.to_string());
    }

    pub async fn snapshot(&self) -> BTreeMap<String, WatcherStatus> {
        self.statuses.read().await.clone()
    }

    /// True when no watcher's most recent cycle failed
    pub async fn is_healthy(&self) -> bool {
        self.statuses.read().await.values().all(WatcherStatus::is_healthy)
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_then_recovery() {
        let board = StatusBoard::new();
        board.register("commit:optimism:USDC").await;
        assert!(board.is_healthy().await);

        board.record_failure("commit:optimism:USDC", "indexer timed out").await;
        assert!(!board.is_healthy().await);

        board.record_success("commit:optimism:USDC").await;
        assert!(board.is_healthy().await);

        let snapshot = board.snapshot().await;
        let status = &snapshot["commit:optimism:USDC"];
        assert_eq!(status.cycles, 2);
        assert_eq!(status.failures, 1);
        assert!(status.last_cycle_at.is_some());
    }
}
