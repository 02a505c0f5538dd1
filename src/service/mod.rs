pub mod backoff;
mod status;
mod ticker;

pub use backoff::{retry_with_backoff, RetryPolicy};
pub use status::{StatusBoard, WatcherStatus};
pub use ticker::Ticker;

use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{create_router, ApiState};
use crate::config::{Chain, Config};
use crate::error::{Result, RootwatchError};
use crate::gateway::{ContractGateway, EvmGateway};
use crate::indexer::{EventSource, GraphIndexer};
use crate::verification::ReconciliationVerifier;
use crate::watchers::{PollingWatcher, WatcherKind, WatcherRegistry};

/// Owns the watcher registry and runs every watcher on its own task
pub struct WatcherService {
    config: Arc<Config>,
    registry: Arc<WatcherRegistry>,
    verifier: Arc<ReconciliationVerifier>,
    status: Arc<StatusBoard>,
    cancel: CancellationToken,
}

impl WatcherService {
    /// Build the service against the configured chains and subgraphs
    pub fn new(config: Config, dry_run: bool) -> Result<Self> {
        config.validate()?;

        if !dry_run && !config.has_signer() {
            return Err(RootwatchError::config(format!(
                "A signer is required unless running dry; set {}",
                crate::config::SIGNER_KEY_ENV
            )));
        }

        let gateway: Arc<dyn ContractGateway> = Arc::new(EvmGateway::from_config(&config)?);
        let events = Self::event_source(&config)?;

        Self::with_components(config, gateway, events, dry_run)
    }

    /// Subgraph client; each page runs under the configured timeout and retry budget
    pub fn event_source(config: &Config) -> Result<Arc<dyn EventSource>> {
        Ok(Arc::new(GraphIndexer::from_config(config)?))
    }

    pub fn with_components(
        config: Config,
        gateway: Arc<dyn ContractGateway>,
        events: Arc<dyn EventSource>,
        dry_run: bool,
    ) -> Result<Self> {
        let registry = Arc::new(WatcherRegistry::build(&config, gateway, events.clone(), dry_run)?);
        let verifier = Arc::new(ReconciliationVerifier::new(events, config.stall_timeout()));

        Ok(Self {
            config: Arc::new(config),
            registry,
            verifier,
            status: Arc::new(StatusBoard::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> Arc<WatcherRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn verifier(&self) -> Arc<ReconciliationVerifier> {
        Arc::clone(&self.verifier)
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.status)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every watcher after its current cycle
    pub fn shutdown(&self) {
        info!("🛑 Shutting down watchers");
        self.cancel.cancel();
    }

    /// Run until [`WatcherService::shutdown`] is called
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!("🚀 Starting rootwatch");
        info!(
            "🔗 Chains: {}",
            self.config
                .chains
                .keys()
                .map(Chain::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut handles = Vec::new();

        for (kind, watcher) in self.registry.polling_watchers() {
            let interval = self.poll_interval(kind);
            self.status.register(&watcher.label()).await;
            handles.push(spawn_watcher(
                watcher,
                interval,
                self.cancel.clone(),
                Arc::clone(&self.status),
            ));
        }

        handles.push(self.spawn_verifier());

        if let Some(port) = self.config.api.rest_port {
            handles.push(self.spawn_api(port));
        }

        info!("👀 {} tasks running", handles.len());

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Watcher task panicked: {}", e);
            }
        }

        info!("All watchers stopped");
        Ok(())
    }

    fn poll_interval(&self, kind: WatcherKind) -> Duration {
        match kind {
            WatcherKind::Commit => self.config.commit_poll_interval(),
            WatcherKind::Bond => self.config.bond_poll_interval(),
            WatcherKind::Relay => self.config.relay_poll_interval(),
        }
    }

    /// Periodic reconciliation of every source pair
    fn spawn_verifier(&self) -> JoinHandle<()> {
        let verifier = Arc::clone(&self.verifier);
        let pairs = self.config.source_pairs();
        let mut ticker = Ticker::new(self.config.verifier_poll_interval(), self.cancel.clone());

        tokio::spawn(async move {
            while ticker.tick().await {
                for (chain, token) in &pairs {
                    match verifier.verify(*chain, *token).await {
                        Ok(report) if !report.stalled.is_empty() => warn!(
                            "⚠️ {} {}: {} roots stalled past the timeout",
                            chain,
                            token,
                            report.stalled.len()
                        ),
                        Ok(_) => {}
                        Err(e) => warn!("Verification of {} {} failed: {}", chain, token, e),
                    }
                }
            }
        })
    }

    fn spawn_api(&self, port: u16) -> JoinHandle<()> {
        let state = ApiState {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            verifier: Arc::clone(&self.verifier),
            status: Arc::clone(&self.status),
        };
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind status API on {}: {}", addr, e);
                    return;
                }
            };

            info!("🌐 Status API listening on {}", addr);
            let server = axum::serve(listener, create_router(state))
                .with_graceful_shutdown(async move { cancel.cancelled().await });

            if let Err(e) = server.await {
                error!("Status API error: {}", e);
            }
        })
    }
}

/// Poll `watcher` every `interval` until cancelled, recording each cycle
pub fn spawn_watcher(
    watcher: Arc<dyn PollingWatcher>,
    interval: Duration,
    cancel: CancellationToken,
    status: Arc<StatusBoard>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let label = watcher.label();
        let mut ticker = Ticker::new(interval, cancel);
        info!("Starting {} (every {:?})", label, interval);

        while ticker.tick().await {
            match watcher.poll().await {
                Ok(()) => status.record_success(&label).await,
                Err(e) => {
                    error!("{} cycle failed: {}", label, e);
                    status.record_failure(&label, &e.to_string()).await;
                }
            }
        }

        info!("{} stopped", label);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerError;
    use crate::testing::{FakeGateway, StaticEventSource, TEST_CONFIG};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWatcher {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl PollingWatcher for CountingWatcher {
        fn label(&self) -> String {
            "counting".to_string()
        }

        async fn poll(&self) -> Result<()> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Err(IndexerError::Timeout.into())
            } else {
                Ok(())
            }
        }
    }

    fn service() -> WatcherService {
        let config = Config::from_toml_str(TEST_CONFIG).unwrap();
        WatcherService::with_components(
            config,
            Arc::new(FakeGateway::new()),
            Arc::new(StaticEventSource::new()),
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_watcher_survives_failed_cycles() {
        let watcher = Arc::new(CountingWatcher {
            polls: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let status = Arc::new(StatusBoard::new());

        let handle = spawn_watcher(watcher.clone(), Duration::ZERO, cancel.clone(), status.clone());
        while watcher.polls.load(Ordering::SeqCst) < 10 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let snapshot = status.snapshot().await;
        assert!(snapshot["counting"].failures >= 5);
    }

    #[tokio::test]
    async fn test_service_stops_on_shutdown() {
        let service = Arc::new(service());
        let cancel = service.cancel_token();

        let handle = tokio::spawn(Arc::clone(&service).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
        assert!(service.status().snapshot().await.contains_key("commit:optimism:USDC"));
    }

    #[test]
    fn test_writes_require_signer() {
        let mut config = Config::from_toml_str(TEST_CONFIG).unwrap();
        config.gateway.private_key = None;
        assert!(WatcherService::new(config, false).is_err());
    }
}
