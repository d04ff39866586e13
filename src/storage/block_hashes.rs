//! Content hashes of audio blocks, used to skip re-uploading known data

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use sha2::{Digest, Sha256};

use super::connection::{prepare, prepare_uncached, SyncStorage};
use crate::error::{LedgerError, Result};
use crate::types::{BlockId, SampleBlockIdSet};

/// Upper bound on block ids bound into a single DELETE
const DELETE_BATCH_SIZE: usize = 500;

/// Hex SHA-256 of a block's bytes
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Stored hash for a block, if known
pub fn get_block_hash(
    conn: &Connection,
    project_id: &str,
    block_id: BlockId,
) -> Result<Option<String>> {
    let mut stmt = prepare(
        conn,
        "SELECT hash FROM block_hashes WHERE project_id = ? AND block_id = ? LIMIT 1",
    )?;
    Ok(stmt
        .query_row(params![project_id, block_id], |row| row.get(0))
        .optional()?)
}

/// Upsert hashes for a batch of blocks
///
/// Does not open a transaction; `SyncStorage::update_block_hashes` wraps it in one.
pub fn update_block_hashes(
    conn: &Connection,
    project_id: &str,
    hashes: &[(BlockId, String)],
) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO block_hashes (project_id, block_id, hash) VALUES (?, ?, ?)",
    )?;
    for (block_id, hash) in hashes {
        stmt.execute(params![project_id, block_id, hash])?;
    }
    Ok(())
}

/// Block ids that currently have a stored hash for the project
pub fn get_hashed_block_ids(conn: &Connection, project_id: &str) -> Result<Vec<BlockId>> {
    let mut stmt = prepare(conn, "SELECT block_id FROM block_hashes WHERE project_id = ?")?;
    let ids = stmt
        .query_map(params![project_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<BlockId>>>()?;
    Ok(ids)
}

/// Drop hash rows for blocks that are no longer part of the project
///
/// Returns how many rows were deleted.
///
/// `block_hashes.project_id` has INTEGER affinity, so ids that SQLite reads as
/// the same number (`"100"`, `"0100"`, `"1e2"`) share one set of rows.
/// Reconciling any of them prunes the others' hashes too.
pub fn update_project_block_list(
    conn: &Connection,
    project_id: &str,
    live_blocks: &SampleBlockIdSet,
) -> Result<usize> {
    let stale: Vec<BlockId> = get_hashed_block_ids(conn, project_id)?
        .into_iter()
        .filter(|id| !live_blocks.contains(id))
        .collect();

    let mut deleted = 0;
    for chunk in stale.chunks(DELETE_BATCH_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "DELETE FROM block_hashes WHERE project_id = ? AND block_id IN ({placeholders})"
        );

        let mut params_vec: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() + 1);
        params_vec.push(&project_id);
        params_vec.extend(chunk.iter().map(|id| id as &dyn ToSql));

        let mut stmt = prepare_uncached(conn, &sql)?;
        deleted += stmt.execute(params_vec.as_slice())?;
    }

    tracing::debug!(project_id, deleted, "Pruned stale block hashes");
    Ok(deleted)
}

/// Any (project, block) already known to have this hash
///
/// Numeric-looking project ids come back in SQLite's canonical form, so a row
/// written under `"1e2"` or `"0100"` is reported as `"100"`.
pub fn get_block_for_hash(conn: &Connection, hash: &str) -> Result<Option<(String, BlockId)>> {
    let mut stmt = prepare(
        conn,
        "SELECT project_id, block_id FROM block_hashes WHERE hash = ? LIMIT 1",
    )?;
    let mut rows = stmt.query(params![hash])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    // project_id has INTEGER affinity, so numeric-looking ids come back as integers
    let project_id = match row.get_ref(0)? {
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        other => {
            return Err(LedgerError::InvalidData(format!(
                "block_hashes.project_id has unexpected type {:?}",
                other.data_type()
            )))
        }
    };
    Ok(Some((project_id, row.get(1)?)))
}

impl SyncStorage {
    pub fn get_block_hash(&self, project_id: &str, block_id: BlockId) -> Result<Option<String>> {
        self.with_connection(|conn| get_block_hash(conn, project_id, block_id))
    }

    /// Upsert hashes atomically: after a crash either all or none are stored
    pub fn update_block_hashes(
        &self,
        project_id: &str,
        hashes: &[(BlockId, String)],
    ) -> Result<()> {
        self.with_transaction("update_block_hashes", |conn| {
            update_block_hashes(conn, project_id, hashes)
        })?;
        tracing::debug!(project_id, count = hashes.len(), "Updated block hashes");
        Ok(())
    }

    /// Reconcile a project's hash rows with the live block set
    pub fn update_project_block_list(
        &self,
        project_id: &str,
        live_blocks: &SampleBlockIdSet,
    ) -> Result<usize> {
        self.with_transaction("update_project_block_list", |conn| {
            update_project_block_list(conn, project_id, live_blocks)
        })
    }

    pub fn get_block_for_hash(&self, hash: &str) -> Result<Option<(String, BlockId)>> {
        self.with_connection(|conn| get_block_for_hash(conn, hash))
    }
}
