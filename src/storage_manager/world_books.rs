use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::db::{now_ms, open_db, DbPool};

/// Where a world-setting fragment is injected into the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldBookPosition {
    Top,
    Middle,
    Bottom,
}

impl WorldBookPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldBookPosition::Top => "top",
            WorldBookPosition::Middle => "middle",
            WorldBookPosition::Bottom => "bottom",
        }
    }

    /// Unknown positions fall back to the middle of the prompt.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "top" | "before" => WorldBookPosition::Top,
            "bottom" | "after" => WorldBookPosition::Bottom,
            _ => WorldBookPosition::Middle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBook {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBookEntry {
    pub id: String,
    pub world_book_id: String,
    pub position: WorldBookPosition,
    pub content: String,
    pub display_order: i32,
}

impl WorldBookEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let position: String = row.get(2)?;
        Ok(WorldBookEntry {
            id: row.get(0)?,
            world_book_id: row.get(1)?,
            position: WorldBookPosition::parse(&position),
            content: row.get(3)?,
            display_order: row.get(4)?,
        })
    }
}

/// Read-only lore and memory lookups used while compiling prompts.
pub trait WorldBookSource: Send + Sync {
    /// Entries of the given books, in the order the ids are listed.
    fn world_book_entries(&self, world_book_ids: &[String]) -> Result<Vec<WorldBookEntry>, String>;

    /// Memory texts for the given ids; unknown ids are skipped.
    fn linked_memories(&self, memory_ids: &[String]) -> Result<Vec<String>, String>;
}

// ============================================================================
// World books
// ============================================================================

pub fn create_world_book(conn: &Connection, name: &str) -> Result<WorldBook, String> {
    let now = now_ms() as i64;
    let book = WorldBook {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO world_books (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![book.id, book.name, now],
    )
    .map_err(|e| format!("Failed to create world book: {}", e))?;
    Ok(book)
}

pub fn add_world_book_entry(
    conn: &Connection,
    world_book_id: &str,
    position: WorldBookPosition,
    content: &str,
    display_order: i32,
) -> Result<WorldBookEntry, String> {
    let entry = WorldBookEntry {
        id: Uuid::new_v4().to_string(),
        world_book_id: world_book_id.to_string(),
        position,
        content: content.to_string(),
        display_order,
    };
    conn.execute(
        "INSERT INTO world_book_entries (id, world_book_id, position, content, display_order, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.world_book_id,
            entry.position.as_str(),
            entry.content,
            entry.display_order,
            now_ms() as i64
        ],
    )
    .map_err(|e| format!("Failed to add world book entry: {}", e))?;
    Ok(entry)
}

pub fn get_world_book_entries(
    conn: &Connection,
    world_book_id: &str,
) -> Result<Vec<WorldBookEntry>, String> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, world_book_id, position, content, display_order
            FROM world_book_entries
            WHERE world_book_id = ?1
            ORDER BY display_order ASC, created_at ASC
            "#,
        )
        .map_err(|e| format!("Failed to prepare world book entries query: {}", e))?;
    let rows = stmt
        .query_map(params![world_book_id], WorldBookEntry::from_row)
        .map_err(|e| format!("Failed to query world book entries: {}", e))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to read world book entry: {}", e))
}

// ============================================================================
// Memories
// ============================================================================

pub fn add_memory(conn: &Connection, content: &str) -> Result<String, String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO memories (id, content, created_at) VALUES (?1, ?2, ?3)",
        params![id, content, now_ms() as i64],
    )
    .map_err(|e| format!("Failed to add memory: {}", e))?;
    Ok(id)
}

pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<String>, String> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT content FROM memories WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| format!("Failed to read memory: {}", e))
}

pub struct SqliteWorldBookSource {
    pool: DbPool,
}

impl SqliteWorldBookSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl WorldBookSource for SqliteWorldBookSource {
    fn world_book_entries(&self, world_book_ids: &[String]) -> Result<Vec<WorldBookEntry>, String> {
        let conn = open_db(&self.pool)?;
        let mut out = Vec::new();
        for id in world_book_ids {
            out.extend(get_world_book_entries(&conn, id)?);
        }
        Ok(out)
    }

    fn linked_memories(&self, memory_ids: &[String]) -> Result<Vec<String>, String> {
        let conn = open_db(&self.pool)?;
        let mut out = Vec::new();
        for id in memory_ids {
            if let Some(content) = get_memory(&conn, id)? {
                out.push(content);
            }
        }
        Ok(out)
    }
}

/// Fixed in-memory lore, for embedding without a database.
#[derive(Debug, Clone, Default)]
pub struct StaticWorldBookSource {
    pub entries: Vec<WorldBookEntry>,
    pub memories: Vec<(String, String)>,
}

impl WorldBookSource for StaticWorldBookSource {
    fn world_book_entries(&self, world_book_ids: &[String]) -> Result<Vec<WorldBookEntry>, String> {
        Ok(world_book_ids
            .iter()
            .flat_map(|id| self.entries.iter().filter(move |e| &e.world_book_id == id))
            .cloned()
            .collect())
    }

    fn linked_memories(&self, memory_ids: &[String]) -> Result<Vec<String>, String> {
        Ok(memory_ids
            .iter()
            .filter_map(|id| {
                self.memories
                    .iter()
                    .find(|(mid, _)| mid == id)
                    .map(|(_, content)| content.clone())
            })
            .collect())
    }
}
