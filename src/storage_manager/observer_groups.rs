use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::db::{now_ms, open_db, DbPool};
use super::GroupStore;
use crate::chat_manager::types::ObserverGroup;

/// Lightweight listing row; the full record lives in the `data` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverGroupSummary {
    pub id: String,
    pub name: String,
    pub updated_at: i64,
}

fn read_observer_group(conn: &Connection, id: &str) -> Result<Option<ObserverGroup>, String> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM observer_groups WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| e.to_string())?;
    match data {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("Corrupt observer group {}: {}", id, e)),
        None => Ok(None),
    }
}

fn write_observer_group(conn: &Connection, group: &ObserverGroup) -> Result<(), String> {
    let data = serde_json::to_string(group).map_err(|e| e.to_string())?;
    let now = now_ms() as i64;
    conn.execute(
        r#"
        INSERT INTO observer_groups (id, name, data, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
          name = excluded.name,
          data = excluded.data,
          updated_at = excluded.updated_at
        "#,
        params![group.id, group.name, data, group.created_at as i64, now],
    )
    .map_err(|e| format!("Failed to save observer group {}: {}", group.id, e))?;
    Ok(())
}

pub fn list_observer_groups(conn: &Connection) -> Result<Vec<ObserverGroupSummary>, String> {
    let mut stmt = conn
        .prepare("SELECT id, name, updated_at FROM observer_groups ORDER BY updated_at DESC")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ObserverGroupSummary {
                id: r.get(0)?,
                name: r.get(1)?,
                updated_at: r.get(2)?,
            })
        })
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

pub fn delete_observer_group(conn: &Connection, id: &str) -> Result<bool, String> {
    let affected = conn
        .execute("DELETE FROM observer_groups WHERE id = ?1", params![id])
        .map_err(|e| e.to_string())?;
    Ok(affected > 0)
}

/// Durable [`GroupStore`] keeping each group as one JSON document.
#[derive(Clone)]
pub struct SqliteGroupStore {
    pool: DbPool,
}

impl SqliteGroupStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn list(&self) -> Result<Vec<ObserverGroupSummary>, String> {
        let conn = open_db(&self.pool)?;
        list_observer_groups(&conn)
    }

    pub fn delete(&self, id: &str) -> Result<bool, String> {
        let conn = open_db(&self.pool)?;
        delete_observer_group(&conn, id)
    }
}

impl GroupStore for SqliteGroupStore {
    fn put(&self, group: &ObserverGroup) -> Result<(), String> {
        let conn = open_db(&self.pool)?;
        write_observer_group(&conn, group)
    }

    fn get(&self, id: &str) -> Result<Option<ObserverGroup>, String> {
        let conn = open_db(&self.pool)?;
        read_observer_group(&conn, id)
    }
}
