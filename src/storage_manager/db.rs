use rusqlite::Connection;
use std::fs;
use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::utils::{log_info, log_warn, now_millis};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const PRAGMAS: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA temp_store=MEMORY;
    PRAGMA cache_size=-8000;
    PRAGMA wal_autocheckpoint=1000;
    PRAGMA foreign_keys=ON;
"#;

/// Create a new pool for a given database path
pub fn create_pool_for_path(path: &Path) -> Result<DbPool, String> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| c.execute_batch(PRAGMAS));

    Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(|e| format!("Failed to create pool: {}", e))
}

pub fn init_pool(path: &Path) -> Result<DbPool, String> {
    log_info("database", format!("Database path: {:?}", path));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            log_info(
                "database",
                format!("Creating parent directory: {:?}", parent),
            );
            fs::create_dir_all(parent).map_err(|e| {
                log_warn(
                    "database",
                    format!("Failed to create parent directory: {:?}", e),
                );
                e.to_string()
            })?;
        }
    }

    let pool = create_pool_for_path(path)?;

    // Initialize the database schema on the first connection
    let conn = pool
        .get()
        .map_err(|e| format!("Failed to get connection from pool for init: {}", e))?;
    init_db(&conn)?;

    Ok(pool)
}

/// Single-connection in-memory database; every checkout sees the same data.
pub fn open_in_memory() -> Result<DbPool, String> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| format!("Failed to create in-memory pool: {}", e))?;
    {
        let conn = pool
            .get()
            .map_err(|e| format!("Failed to get connection from pool for init: {}", e))?;
        init_db(&conn)?;
    }
    Ok(pool)
}

pub fn open_db(pool: &DbPool) -> Result<DbConnection, String> {
    pool.get()
        .map_err(|e| format!("Failed to get connection from pool: {}", e))
}

pub fn init_db(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
          id INTEGER PRIMARY KEY CHECK(id=1),
          data TEXT NOT NULL DEFAULT '{}',
          updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS observer_groups (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          data TEXT NOT NULL,
          created_at INTEGER NOT NULL,
          updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS world_books (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          created_at INTEGER NOT NULL,
          updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS world_book_entries (
          id TEXT PRIMARY KEY,
          world_book_id TEXT NOT NULL,
          position TEXT NOT NULL DEFAULT 'middle',
          content TEXT NOT NULL,
          display_order INTEGER NOT NULL DEFAULT 0,
          created_at INTEGER NOT NULL,
          FOREIGN KEY(world_book_id) REFERENCES world_books(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_world_book_entries_book ON world_book_entries(world_book_id);

        CREATE TABLE IF NOT EXISTS memories (
          id TEXT PRIMARY KEY,
          content TEXT NOT NULL,
          created_at INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| e.to_string())
}

pub fn now_ms() -> u64 {
    now_millis().unwrap_or(0)
}

/// Force a WAL checkpoint so pending writes land in the main database file.
pub fn db_checkpoint(pool: &DbPool) -> Result<(), String> {
    let conn = open_db(pool)?;
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .map_err(|e| format!("WAL checkpoint failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_pool_shares_schema() {
        let pool = open_in_memory().unwrap();
        let conn = open_db(&pool).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='observer_groups'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_init_pool_creates_file_database() {
        let dir = std::env::temp_dir().join(format!("observer-chat-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("app.db");
        let pool = init_pool(&path).unwrap();
        assert!(path.exists());
        db_checkpoint(&pool).unwrap();
        drop(pool);
        let _ = std::fs::remove_dir_all(dir);
    }
}
