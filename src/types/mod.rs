pub mod de;
pub mod merkle;
pub mod relay;
pub mod transfer;

// Re-export commonly used types
pub use merkle::merkle_root;
pub use relay::{RelayMessage, RelayStatus};
pub use transfer::{Bond, PendingBatch, RootHash, TransferRoot, TxHash};
