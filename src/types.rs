//! Core types for the sync ledger

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an audio sample block within a project
pub type BlockId = i64;

/// The authoritative set of block ids currently alive in a project
pub type SampleBlockIdSet = HashSet<BlockId>;

/// File name of the ledger inside the platform config directory
pub const DEFAULT_DB_FILE_NAME: &str = "audiocom_sync.db";

/// Whether a project's last known snapshot matches what the server confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    NotSynced,
    Synced,
    Uploading,
    Downloading,
}

impl SyncStatus {
    /// Integer stored in the `sync_status` column
    pub fn as_i64(&self) -> i64 {
        match self {
            SyncStatus::NotSynced => 0,
            SyncStatus::Synced => 1,
            SyncStatus::Uploading => 2,
            SyncStatus::Downloading => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SyncStatus::NotSynced),
            1 => Some(SyncStatus::Synced),
            2 => Some(SyncStatus::Uploading),
            3 => Some(SyncStatus::Downloading),
            _ => None,
        }
    }
}

/// Per-project sync metadata, one row per known local project
///
/// Timestamps are unix seconds, stored as-is so that a record read back
/// compares equal to the one written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: String,
    pub snapshot_id: String,
    pub saves_count: i64,
    pub last_audio_preview_save: i64,
    pub local_path: String,
    pub last_modified: i64,
    pub last_read: i64,
    pub sync_status: SyncStatus,
}

impl ProjectRecord {
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_modified, 0)
    }

    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_read, 0)
    }

    pub fn last_audio_preview_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_audio_preview_save, 0)
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status == SyncStatus::Synced
    }
}

/// A snapshot created server-side that still awaits confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    pub project_id: String,
    pub snapshot_id: String,
    pub confirm_url: String,
}

/// Serialized project document awaiting upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProjectBlob {
    pub project_id: String,
    pub snapshot_id: String,
    pub upload_url: String,
    pub confirm_url: String,
    pub fail_url: String,
    pub blob: Vec<u8>,
}

/// A single audio block still pending upload or confirmation
///
/// While a row exists the block is locked: it must not be evicted or reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProjectBlock {
    pub project_id: String,
    pub snapshot_id: String,
    pub upload_url: String,
    pub confirm_url: String,
    pub fail_url: String,
    pub block_id: BlockId,
    pub block_sample_format: i64,
    pub block_hash: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database, `~` is expanded. `:memory:` keeps it in RAM.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Storage mode (local or cloud-safe)
    #[serde(default)]
    pub storage_mode: StorageMode,
}

fn default_db_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_FILE_NAME)
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage_mode: StorageMode::default(),
        }
    }
}

impl StoreConfig {
    /// Config for a database at `db_path`
    pub fn at(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            storage_mode: StorageMode::default(),
        }
    }

    /// In-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self::at(":memory:")
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }

    /// Database path with `~` expanded
    pub fn resolved_path(&self) -> String {
        shellexpand::tilde(&self.db_path).into_owned()
    }
}

/// Journal mode selection for the SQLite file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// WAL journal, best for a local config directory
    #[default]
    Local,
    /// DELETE journal, for config directories mirrored by a cloud folder client
    CloudSafe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_column_values() {
        for status in [
            SyncStatus::NotSynced,
            SyncStatus::Synced,
            SyncStatus::Uploading,
            SyncStatus::Downloading,
        ] {
            assert_eq!(SyncStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(SyncStatus::from_i64(42), None);
        assert_eq!(SyncStatus::default(), SyncStatus::NotSynced);
    }

    #[test]
    fn test_timestamp_accessors() {
        let record = ProjectRecord {
            last_modified: 1_700_000_000,
            ..Default::default()
        };
        let at = record.last_modified_at().unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(record.last_read_at().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_default_config_points_at_sync_db() {
        let config = StoreConfig::default();
        assert!(config.db_path.ends_with(DEFAULT_DB_FILE_NAME));
        assert_eq!(config.storage_mode, StorageMode::Local);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_tilde_expansion() {
        let config = StoreConfig::at("~/ledger/sync.db");
        let resolved = config.resolved_path();
        assert!(!resolved.starts_with('~') || dirs::home_dir().is_none());
        assert!(resolved.ends_with("ledger/sync.db"));
    }
}
