//! Sync ledger for cloud-backed audio projects
//!
//! Persistent local record of which project snapshots exist locally and
//! remotely, which upload steps are still in flight, and which audio blocks
//! have already been hashed for deduplication. Also classifies finished
//! network requests for the retry logic driving uploads.

pub mod error;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod types;

pub use error::{LedgerError, Result};
pub use network::{get_response_result, set_common_headers, ResponseResult, ResponseResultCode};
pub use storage::SyncStorage;
pub use transfer::TransferStats;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
