//! Project owner display names
//!
//! Filled in by the account service; never refreshed from here.
//!
//! `project_id` has INTEGER affinity, so ids that parse to the same number
//! (`"100"` and `"0100"`) address the same slug.

use rusqlite::{params, Connection, OptionalExtension};

use super::connection::{prepare, SyncStorage};
use crate::error::Result;

pub fn get_project_user_slug(conn: &Connection, project_id: &str) -> Result<Option<String>> {
    let mut stmt = prepare(
        conn,
        "SELECT user_name FROM project_users WHERE project_id = ? LIMIT 1",
    )?;
    Ok(stmt
        .query_row(params![project_id], |row| row.get(0))
        .optional()?)
}

pub fn set_project_user_slug(conn: &Connection, project_id: &str, slug: &str) -> Result<()> {
    let mut stmt = prepare(
        conn,
        "INSERT OR REPLACE INTO project_users (project_id, user_name) VALUES (?, ?)",
    )?;
    stmt.execute(params![project_id, slug])?;
    Ok(())
}

impl SyncStorage {
    pub fn get_project_user_slug(&self, project_id: &str) -> Result<Option<String>> {
        self.with_connection(|conn| get_project_user_slug(conn, project_id))
    }

    pub fn set_project_user_slug(&self, project_id: &str, slug: &str) -> Result<()> {
        self.with_connection(|conn| set_project_user_slug(conn, project_id, slug))
    }
}
