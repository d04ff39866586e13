//! Durable queues of in-flight uploads
//!
//! Each row records a step of the snapshot upload protocol that has been
//! started but not finalized, so it can be resumed after a restart:
//!
//! - `pending_snapshots`: snapshot created server-side, awaiting confirmation
//! - `pending_project_blobs`: serialized project document awaiting upload
//! - `pending_project_blocks`: audio blocks awaiting upload; a row locks its block
//!
//! Removing a row that does not exist is not an error.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::{prepare, SyncStorage};
use crate::error::Result;
use crate::types::{BlockId, PendingProjectBlob, PendingProjectBlock, PendingSnapshot};

// -- snapshots ---------------------------------------------------------------

pub fn add_pending_snapshot(conn: &Connection, snapshot: &PendingSnapshot) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO pending_snapshots (project_id, snapshot_id, confirm_url) \
         VALUES (?, ?, ?)",
    )?;
    stmt.execute(params![
        snapshot.project_id,
        snapshot.snapshot_id,
        snapshot.confirm_url
    ])?;
    Ok(())
}

pub fn remove_pending_snapshot(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "DELETE FROM pending_snapshots WHERE project_id = ? AND snapshot_id = ?",
    )?;
    stmt.execute(params![project_id, snapshot_id])?;
    Ok(())
}

pub fn get_pending_snapshots(conn: &Connection, project_id: &str) -> Result<Vec<PendingSnapshot>> {
    let mut stmt = prepare(
        conn,
        "SELECT project_id, snapshot_id, confirm_url FROM pending_snapshots WHERE project_id = ?",
    )?;
    let snapshots = stmt
        .query_map(params![project_id], |row| {
            Ok(PendingSnapshot {
                project_id: row.get(0)?,
                snapshot_id: row.get(1)?,
                confirm_url: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snapshots)
}

// -- project blobs -----------------------------------------------------------

pub fn add_pending_project_blob(conn: &Connection, blob: &PendingProjectBlob) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO pending_project_blobs \
         (project_id, snapshot_id, upload_url, confirm_url, fail_url, blob) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )?;
    stmt.execute(params![
        blob.project_id,
        blob.snapshot_id,
        blob.upload_url,
        blob.confirm_url,
        blob.fail_url,
        blob.blob,
    ])?;
    Ok(())
}

pub fn remove_pending_project_blob(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "DELETE FROM pending_project_blobs WHERE project_id = ? AND snapshot_id = ?",
    )?;
    stmt.execute(params![project_id, snapshot_id])?;
    Ok(())
}

pub fn get_pending_project_blob(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<Option<PendingProjectBlob>> {
    let mut stmt = prepare(
        conn,
        "SELECT project_id, snapshot_id, upload_url, confirm_url, fail_url, blob \
         FROM pending_project_blobs WHERE project_id = ? AND snapshot_id = ?",
    )?;
    let blob = stmt
        .query_row(params![project_id, snapshot_id], |row| {
            Ok(PendingProjectBlob {
                project_id: row.get(0)?,
                snapshot_id: row.get(1)?,
                upload_url: row.get(2)?,
                confirm_url: row.get(3)?,
                fail_url: row.get(4)?,
                // A zero-length payload may come back as NULL
                blob: row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default(),
            })
        })
        .optional()?;
    Ok(blob)
}

// -- project blocks ----------------------------------------------------------

fn block_from_row(row: &Row) -> rusqlite::Result<PendingProjectBlock> {
    Ok(PendingProjectBlock {
        project_id: row.get(0)?,
        snapshot_id: row.get(1)?,
        upload_url: row.get(2)?,
        confirm_url: row.get(3)?,
        fail_url: row.get(4)?,
        block_id: row.get(5)?,
        block_sample_format: row.get(6)?,
        block_hash: row.get(7)?,
    })
}

/// Insert a batch of pending blocks
///
/// Does not open a transaction; `SyncStorage::add_pending_project_blocks` wraps it in one.
pub fn add_pending_project_blocks(conn: &Connection, blocks: &[PendingProjectBlock]) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO pending_project_blocks \
         (project_id, snapshot_id, upload_url, confirm_url, fail_url, \
          block_id, block_sample_format, block_hash) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for block in blocks {
        stmt.execute(params![
            block.project_id,
            block.snapshot_id,
            block.upload_url,
            block.confirm_url,
            block.fail_url,
            block.block_id,
            block.block_sample_format,
            block.block_hash,
        ])?;
    }
    Ok(())
}

pub fn remove_pending_project_block(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
    block_id: BlockId,
) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "DELETE FROM pending_project_blocks \
         WHERE project_id = ? AND snapshot_id = ? AND block_id = ?",
    )?;
    stmt.execute(params![project_id, snapshot_id, block_id])?;
    Ok(())
}

/// Remove every pending block of a snapshot, returning how many were dropped
pub fn remove_pending_project_blocks(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<usize> {
    let mut stmt = prepare(
        conn,
        "DELETE FROM pending_project_blocks WHERE project_id = ? AND snapshot_id = ?",
    )?;
    Ok(stmt.execute(params![project_id, snapshot_id])?)
}

pub fn get_pending_project_blocks(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<Vec<PendingProjectBlock>> {
    let mut stmt = prepare(
        conn,
        "SELECT project_id, snapshot_id, upload_url, confirm_url, fail_url, \
         block_id, block_sample_format, block_hash \
         FROM pending_project_blocks WHERE project_id = ? AND snapshot_id = ? \
         ORDER BY block_id",
    )?;
    let blocks = stmt
        .query_map(params![project_id, snapshot_id], block_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(blocks)
}

/// Whether any snapshot of the project still waits on this block
pub fn is_project_block_locked(
    conn: &Connection,
    project_id: &str,
    block_id: BlockId,
) -> Result<bool> {
    let mut stmt = prepare(
        conn,
        "SELECT 1 FROM pending_project_blocks WHERE project_id = ? AND block_id = ? LIMIT 1",
    )?;
    Ok(stmt.exists(params![project_id, block_id])?)
}

impl SyncStorage {
    pub fn add_pending_snapshot(&self, snapshot: &PendingSnapshot) -> Result<()> {
        self.with_connection(|conn| add_pending_snapshot(conn, snapshot))
    }

    pub fn remove_pending_snapshot(&self, project_id: &str, snapshot_id: &str) -> Result<()> {
        self.with_connection(|conn| remove_pending_snapshot(conn, project_id, snapshot_id))
    }

    pub fn get_pending_snapshots(&self, project_id: &str) -> Result<Vec<PendingSnapshot>> {
        self.with_connection(|conn| get_pending_snapshots(conn, project_id))
    }

    pub fn add_pending_project_blob(&self, blob: &PendingProjectBlob) -> Result<()> {
        self.with_connection(|conn| add_pending_project_blob(conn, blob))
    }

    pub fn remove_pending_project_blob(&self, project_id: &str, snapshot_id: &str) -> Result<()> {
        self.with_connection(|conn| remove_pending_project_blob(conn, project_id, snapshot_id))
    }

    pub fn get_pending_project_blob(
        &self,
        project_id: &str,
        snapshot_id: &str,
    ) -> Result<Option<PendingProjectBlob>> {
        self.with_connection(|conn| get_pending_project_blob(conn, project_id, snapshot_id))
    }

    /// Insert a batch of pending blocks; either all rows land or none do
    pub fn add_pending_project_blocks(&self, blocks: &[PendingProjectBlock]) -> Result<()> {
        self.with_transaction("add_pending_project_blocks", |conn| {
            add_pending_project_blocks(conn, blocks)
        })?;
        tracing::debug!(count = blocks.len(), "Queued pending project blocks");
        Ok(())
    }

    pub fn remove_pending_project_block(
        &self,
        project_id: &str,
        snapshot_id: &str,
        block_id: BlockId,
    ) -> Result<()> {
        self.with_connection(|conn| {
            remove_pending_project_block(conn, project_id, snapshot_id, block_id)
        })
    }

    pub fn remove_pending_project_blocks(
        &self,
        project_id: &str,
        snapshot_id: &str,
    ) -> Result<usize> {
        self.with_connection(|conn| remove_pending_project_blocks(conn, project_id, snapshot_id))
    }

    pub fn get_pending_project_blocks(
        &self,
        project_id: &str,
        snapshot_id: &str,
    ) -> Result<Vec<PendingProjectBlock>> {
        self.with_connection(|conn| get_pending_project_blocks(conn, project_id, snapshot_id))
    }

    pub fn is_project_block_locked(&self, project_id: &str, block_id: BlockId) -> Result<bool> {
        self.with_connection(|conn| is_project_block_locked(conn, project_id, block_id))
    }
}
