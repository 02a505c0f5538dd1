pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod indexer;
pub mod lifecycle;
pub mod service;
pub mod types;
pub mod verification;
pub mod watchers;

#[cfg(test)]
mod testing;

// Re-exports
pub use api::ApiState;
pub use config::{Chain, Config, Token};
pub use error::{Result, RootwatchError};
pub use gateway::{ContractGateway, EvmGateway};
pub use indexer::{EventSource, GraphIndexer};
pub use lifecycle::{RootEvent, RootState};
pub use service::WatcherService;
pub use types::{Bond, PendingBatch, RootHash, TransferRoot, TxHash};
pub use verification::{ReconciliationVerifier, VerificationReport};
pub use watchers::{BondWatcher, CommitWatcher, RelayWatcher, WatcherRegistry};
