//! Schema for the sync ledger
//!
//! Table and column names are a durable contract with stores written by
//! earlier releases, including the INTEGER affinity on
//! `block_hashes.project_id` and `project_users.project_id`.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current_version < SCHEMA_VERSION {
        migrate_v1(conn)?;
        tracing::info!(version = SCHEMA_VERSION, "Sync ledger schema applied");
    }

    Ok(())
}

/// Initial schema (v1)
///
/// Every statement is `IF NOT EXISTS` so a store created before version
/// bookkeeping existed is adopted as-is.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects
        (
            project_id TEXT,
            snapshot_id TEXT,
            saves_count INTEGER,
            last_audio_preview_save INTEGER,
            local_path TEXT,
            last_modified INTEGER,
            last_read INTEGER,
            sync_status INTEGER,
            PRIMARY KEY (project_id)
        );

        CREATE INDEX IF NOT EXISTS local_path_index ON projects (local_path);

        CREATE TABLE IF NOT EXISTS block_hashes
        (
            project_id INTEGER,
            block_id INTEGER,
            hash TEXT,
            PRIMARY KEY (project_id, block_id)
        );

        CREATE INDEX IF NOT EXISTS block_hashes_index ON block_hashes (hash);

        CREATE TABLE IF NOT EXISTS pending_snapshots
        (
            project_id TEXT,
            snapshot_id TEXT,
            confirm_url TEXT,
            PRIMARY KEY (project_id, snapshot_id)
        );

        CREATE TABLE IF NOT EXISTS pending_project_blobs
        (
            project_id TEXT,
            snapshot_id TEXT,

            upload_url TEXT,
            confirm_url TEXT,
            fail_url TEXT,

            blob BLOB,
            PRIMARY KEY (project_id, snapshot_id)
        );

        CREATE TABLE IF NOT EXISTS pending_project_blocks
        (
            project_id TEXT,
            snapshot_id TEXT,

            upload_url TEXT,
            confirm_url TEXT,
            fail_url TEXT,

            block_id INTEGER,
            block_sample_format INTEGER,
            block_hash TEXT,
            PRIMARY KEY (project_id, snapshot_id, block_id)
        );

        CREATE TABLE IF NOT EXISTS project_users
        (
            project_id INTEGER,
            user_name TEXT,
            PRIMARY KEY (project_id)
        );

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}
