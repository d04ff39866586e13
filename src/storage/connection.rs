//! Lazily opened, lock-guarded SQLite connection
//!
//! A `SyncStorage` is created without touching the disk. The connection is
//! established by `open()` or by the first operation that needs it, whichever
//! comes first, and is shared by every clone of the handle.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rusqlite::{CachedStatement, Connection, OpenFlags, Statement};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::{LedgerError, Result};
use crate::types::{StorageMode, StoreConfig};

/// Handle to the sync ledger database
///
/// Meant to live for the whole process and be handed to the sync
/// orchestration code. Clones share the same connection.
pub struct SyncStorage {
    config: StoreConfig,
    conn: Arc<Mutex<Option<Connection>>>,
    savepoints: Arc<AtomicU64>,
}

impl SyncStorage {
    /// Create a handle without opening the database
    pub fn create(config: StoreConfig) -> Self {
        Self {
            config,
            conn: Arc::new(Mutex::new(None)),
            savepoints: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create and open in one step
    pub fn open_with(config: StoreConfig) -> Result<Self> {
        let storage = Self::create(config);
        storage.open()?;
        Ok(storage)
    }

    /// Open with default configuration (in-memory for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with(StoreConfig::in_memory())
    }

    /// Open the database and apply the schema. Repeated calls are no-ops.
    pub fn open(&self) -> Result<()> {
        self.connection().map(|_| ())
    }

    /// Whether a live connection is currently held
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Exclusive access to the connection, opening it first if needed
    pub fn connection(&self) -> Result<MappedMutexGuard<'_, Connection>> {
        let mut slot = self.conn.lock();
        if slot.is_none() {
            *slot = Some(Self::establish(&self.config)?);
        }
        MutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| LedgerError::Unavailable("connection slot is empty".to_string()))
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Execute a function inside a savepoint named `<label>_<n>`
    ///
    /// The savepoint is released only when `f` succeeds; on error or panic it
    /// is rolled back, so readers never observe a partial batch.
    pub fn with_transaction<F, T>(&self, label: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let name = format!(
            "{}_{}",
            label,
            self.savepoints.fetch_add(1, Ordering::Relaxed)
        );
        tracing::trace!(savepoint = %name, "begin");
        let sp = conn.savepoint_with_name(name.as_str())?;
        let result = f(&sp)?;
        sp.commit()?;
        tracing::trace!(savepoint = %name, "committed");
        Ok(result)
    }

    fn establish(config: &StoreConfig) -> Result<Connection> {
        match Self::create_connection(config) {
            Ok(conn) => {
                tracing::info!(db_path = %config.db_path, "Sync ledger opened");
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(db_path = %config.db_path, error = %e, "Failed to open sync ledger");
                Err(LedgerError::Unavailable(e.to_string()))
            }
        }
    }

    /// Create a new connection with appropriate pragmas and schema
    fn create_connection(config: &StoreConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let db_path = config.resolved_path();
            // Ensure parent directory exists
            if let Some(parent) = Path::new(&db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&db_path, flags)?
        };

        Self::configure_pragmas(&conn, config.storage_mode)?;
        run_migrations(&conn)?;

        Ok(conn)
    }

    /// Configure SQLite pragmas based on storage mode
    fn configure_pragmas(conn: &Connection, mode: StorageMode) -> Result<()> {
        match mode {
            StorageMode::Local => {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
            StorageMode::CloudSafe => {
                // Single-file mode, safe when the config dir is mirrored
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=DELETE;
                    PRAGMA synchronous=FULL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
        }
        Ok(())
    }

    /// Checkpoint WAL file (for local mode)
    pub fn checkpoint(&self) -> Result<()> {
        if self.config.storage_mode == StorageMode::Local && !self.config.is_in_memory() {
            let conn = self.connection()?;
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        Ok(())
    }

    /// Get current storage mode
    pub fn storage_mode(&self) -> StorageMode {
        self.config.storage_mode
    }

    /// Get database path as configured
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    /// Get configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Clone for SyncStorage {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
            savepoints: self.savepoints.clone(),
        }
    }
}

/// Prepare a cached statement
///
/// Every statement in this crate is a constant, so failing to prepare one is
/// a bug rather than a runtime condition. Debug builds stop here.
pub(crate) fn prepare<'c>(conn: &'c Connection, sql: &str) -> Result<CachedStatement<'c>> {
    conn.prepare_cached(sql).map_err(|e| prepare_failed(sql, e))
}

/// Prepare a statement whose text varies per call, bypassing the cache
pub(crate) fn prepare_uncached<'c>(conn: &'c Connection, sql: &str) -> Result<Statement<'c>> {
    conn.prepare(sql).map_err(|e| prepare_failed(sql, e))
}

fn prepare_failed(sql: &str, e: rusqlite::Error) -> LedgerError {
    tracing::error!(error = %e, sql, "Failed to prepare statement");
    debug_assert!(false, "failed to prepare statement `{sql}`: {e}");
    LedgerError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = SyncStorage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
        assert!(storage.is_open());
    }

    #[test]
    fn test_create_does_not_open() {
        let storage = SyncStorage::create(StoreConfig::in_memory());
        assert!(!storage.is_open());

        // First use opens lazily
        storage.with_connection(|_| Ok(())).unwrap();
        assert!(storage.is_open());
    }

    #[test]
    fn test_open_is_idempotent() {
        let storage = SyncStorage::create(StoreConfig::in_memory());
        storage.open().unwrap();
        storage
            .with_connection(|conn| {
                conn.execute("CREATE TABLE marker (x INTEGER)", [])?;
                Ok(())
            })
            .unwrap();

        // A second open must keep the same in-memory connection
        storage.open().unwrap();
        let count: i64 = storage
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'marker'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_clones_share_connection() {
        let storage = SyncStorage::create(StoreConfig::in_memory());
        let clone = storage.clone();
        clone.open().unwrap();
        assert!(storage.is_open());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let result: Result<()> = storage.with_transaction("test", |conn| {
            conn.execute(
                "INSERT INTO project_users (project_id, user_name) VALUES ('p', 'u')",
                [],
            )?;
            Err(LedgerError::InvalidData("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = storage
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM project_users", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_storage_modes() {
        let config = StoreConfig {
            db_path: ":memory:".to_string(),
            storage_mode: StorageMode::CloudSafe,
        };
        let storage = SyncStorage::open_with(config).unwrap();
        assert_eq!(storage.storage_mode(), StorageMode::CloudSafe);
        storage.checkpoint().unwrap();
    }

    #[test]
    fn test_prepare_uncached_runs_statement() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let count: i64 = storage
            .with_connection(|conn| {
                let mut stmt = prepare_uncached(conn, "SELECT COUNT(*) FROM block_hashes")?;
                Ok(stmt.query_row([], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "failed to prepare statement")]
    fn test_prepare_uncached_asserts_on_bad_sql() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let _ = storage.with_connection(|conn| {
            prepare_uncached(conn, "DELETE FROM no_such_table WHERE block_id IN (?)")?;
            Ok(())
        });
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_prepare_uncached_reports_bad_sql() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let err = storage
            .with_connection(|conn| {
                prepare_uncached(conn, "DELETE FROM no_such_table WHERE block_id IN (?)")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Database(_)));
    }
}
