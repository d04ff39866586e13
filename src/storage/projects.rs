//! Per-project sync metadata

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::{prepare, SyncStorage};
use crate::error::{LedgerError, Result};
use crate::types::{ProjectRecord, SyncStatus};

const SELECT_PROJECT: &str = "SELECT project_id, snapshot_id, saves_count, \
     last_audio_preview_save, local_path, last_modified, last_read, sync_status \
     FROM projects";

/// Raw row, before `sync_status` is validated
struct ProjectRow {
    record: ProjectRecord,
    sync_status: i64,
}

fn project_from_row(row: &Row) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        record: ProjectRecord {
            project_id: row.get(0)?,
            snapshot_id: row.get(1)?,
            saves_count: row.get(2)?,
            last_audio_preview_save: row.get(3)?,
            local_path: row.get(4)?,
            last_modified: row.get(5)?,
            last_read: row.get(6)?,
            sync_status: SyncStatus::NotSynced,
        },
        sync_status: row.get(7)?,
    })
}

fn finish(row: Option<ProjectRow>) -> Result<Option<ProjectRecord>> {
    let Some(ProjectRow {
        mut record,
        sync_status,
    }) = row
    else {
        return Ok(None);
    };

    record.sync_status = SyncStatus::from_i64(sync_status).ok_or_else(|| {
        LedgerError::InvalidData(format!(
            "project {} has unknown sync_status {}",
            record.project_id, sync_status
        ))
    })?;
    Ok(Some(record))
}

/// Look up a project by id
pub fn get_project_data(conn: &Connection, project_id: &str) -> Result<Option<ProjectRecord>> {
    let mut stmt = prepare(
        conn,
        &format!("{SELECT_PROJECT} WHERE project_id = ? LIMIT 1"),
    )?;
    let row = stmt
        .query_row(params![project_id], project_from_row)
        .optional()?;
    finish(row)
}

/// Look up a project by its local file path
pub fn get_project_data_for_path(
    conn: &Connection,
    local_path: &str,
) -> Result<Option<ProjectRecord>> {
    let mut stmt = prepare(
        conn,
        &format!("{SELECT_PROJECT} WHERE local_path = ? LIMIT 1"),
    )?;
    let row = stmt
        .query_row(params![local_path], project_from_row)
        .optional()?;
    finish(row)
}

/// Insert or overwrite every field of a project record
pub fn update_project_data(conn: &Connection, record: &ProjectRecord) -> Result<bool> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO projects (project_id, snapshot_id, saves_count, \
         last_audio_preview_save, local_path, last_modified, last_read, sync_status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    let changed = stmt.execute(params![
        record.project_id,
        record.snapshot_id,
        record.saves_count,
        record.last_audio_preview_save,
        record.local_path,
        record.last_modified,
        record.last_read,
        record.sync_status.as_i64(),
    ])?;
    Ok(changed > 0)
}

/// Mark a project as synced, but only if its stored snapshot is still `snapshot_id`
///
/// Returns false when the project is unknown or a newer snapshot has replaced
/// the one being confirmed.
pub fn mark_project_as_synced(
    conn: &Connection,
    project_id: &str,
    snapshot_id: &str,
) -> Result<bool> {
    let mut stmt = prepare(
        conn,
        "UPDATE projects SET sync_status = ? WHERE project_id = ? AND snapshot_id = ?",
    )?;
    let changed = stmt.execute(params![
        SyncStatus::Synced.as_i64(),
        project_id,
        snapshot_id
    ])?;
    Ok(changed > 0)
}

impl SyncStorage {
    pub fn get_project_data(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        self.with_connection(|conn| get_project_data(conn, project_id))
    }

    pub fn get_project_data_for_path(&self, local_path: &str) -> Result<Option<ProjectRecord>> {
        self.with_connection(|conn| get_project_data_for_path(conn, local_path))
    }

    pub fn update_project_data(&self, record: &ProjectRecord) -> Result<bool> {
        self.with_connection(|conn| update_project_data(conn, record))
    }

    pub fn mark_project_as_synced(&self, project_id: &str, snapshot_id: &str) -> Result<bool> {
        self.with_connection(|conn| mark_project_as_synced(conn, project_id, snapshot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(project_id: &str, snapshot_id: &str) -> ProjectRecord {
        ProjectRecord {
            project_id: project_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
            saves_count: 4,
            last_audio_preview_save: 1_700_000_100,
            local_path: format!("/home/user/{project_id}.aup3"),
            last_modified: 1_700_000_200,
            last_read: 1_700_000_300,
            sync_status: SyncStatus::Uploading,
        }
    }

    #[test]
    fn test_round_trip_by_id_and_path() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let written = record("p1", "s1");

        assert!(storage.update_project_data(&written).unwrap());

        assert_eq!(storage.get_project_data("p1").unwrap(), Some(written.clone()));
        assert_eq!(
            storage
                .get_project_data_for_path("/home/user/p1.aup3")
                .unwrap(),
            Some(written)
        );
    }

    #[test]
    fn test_round_trip_empty_fields() {
        let storage = SyncStorage::open_in_memory().unwrap();
        let written = ProjectRecord {
            project_id: "p-empty".to_string(),
            ..Default::default()
        };

        storage.update_project_data(&written).unwrap();
        assert_eq!(storage.get_project_data("p-empty").unwrap(), Some(written));
    }

    #[test]
    fn test_missing_project_is_none() {
        let storage = SyncStorage::open_in_memory().unwrap();
        assert_eq!(storage.get_project_data("nope").unwrap(), None);
        assert_eq!(storage.get_project_data_for_path("/nope").unwrap(), None);
    }

    #[test]
    fn test_update_overwrites_all_fields() {
        let storage = SyncStorage::open_in_memory().unwrap();
        storage.update_project_data(&record("p1", "s1")).unwrap();

        let mut newer = record("p1", "s2");
        newer.saves_count = 9;
        newer.local_path = "/elsewhere.aup3".to_string();
        newer.sync_status = SyncStatus::NotSynced;
        storage.update_project_data(&newer).unwrap();

        assert_eq!(storage.get_project_data("p1").unwrap(), Some(newer));
        assert_eq!(
            storage
                .get_project_data_for_path("/home/user/p1.aup3")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_mark_synced_requires_matching_snapshot() {
        let storage = SyncStorage::open_in_memory().unwrap();
        storage.update_project_data(&record("p1", "s2")).unwrap();

        // Stale snapshot confirmation must not flip the status
        assert!(!storage.mark_project_as_synced("p1", "s1").unwrap());
        assert_eq!(
            storage.get_project_data("p1").unwrap().unwrap().sync_status,
            SyncStatus::Uploading
        );

        assert!(storage.mark_project_as_synced("p1", "s2").unwrap());
        assert!(storage.get_project_data("p1").unwrap().unwrap().is_synced());
    }

    #[test]
    fn test_mark_synced_unknown_project() {
        let storage = SyncStorage::open_in_memory().unwrap();
        assert!(!storage.mark_project_as_synced("ghost", "s1").unwrap());
    }

    #[test]
    fn test_unknown_sync_status_is_invalid_data() {
        let storage = SyncStorage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO projects VALUES ('p9', 's', 0, 0, '/p9', 0, 0, 77)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let err = storage.get_project_data("p9").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidData(_)));
    }
}
