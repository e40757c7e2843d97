use rusqlite::{params, Connection, OptionalExtension};

use super::db::now_ms;
use crate::config::ObserverSettings;

fn db_read_settings_json(conn: &Connection) -> Result<Option<String>, String> {
    conn.query_row("SELECT data FROM settings WHERE id = 1", [], |r| r.get(0))
        .optional()
        .map_err(|e| e.to_string())
}

/// Stored settings, or defaults when nothing has been saved yet.
pub fn read_settings(conn: &Connection) -> Result<ObserverSettings, String> {
    match db_read_settings_json(conn)? {
        Some(raw) => ObserverSettings::from_json_str(&raw),
        None => Ok(ObserverSettings::default()),
    }
}

pub fn write_settings(conn: &Connection, settings: &ObserverSettings) -> Result<(), String> {
    let data = serde_json::to_string(settings).map_err(|e| e.to_string())?;
    conn.execute(
        r#"
        INSERT INTO settings (id, data, updated_at) VALUES (1, ?1, ?2)
        ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
        "#,
        params![data, now_ms() as i64],
    )
    .map_err(|e| format!("Failed to save settings: {}", e))?;
    Ok(())
}

/// Stored settings with `OBSERVER_*` environment variables applied on top.
pub fn load_effective_settings(conn: &Connection) -> Result<ObserverSettings, String> {
    let mut settings = read_settings(conn)?;
    settings.apply_env_overrides();
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_manager::db::{open_db, open_in_memory};

    #[test]
    fn test_read_without_row_returns_defaults() {
        let pool = open_in_memory().unwrap();
        let conn = open_db(&pool).unwrap();
        assert_eq!(read_settings(&conn).unwrap(), ObserverSettings::default());
    }

    #[test]
    fn test_write_then_read_overwrites_single_row() {
        let pool = open_in_memory().unwrap();
        let conn = open_db(&pool).unwrap();

        let mut settings = ObserverSettings::default();
        settings.api.model = "gemini-1.5-flash".into();
        write_settings(&conn, &settings).unwrap();

        settings.reply_count = 5;
        write_settings(&conn, &settings).unwrap();

        let loaded = read_settings(&conn).unwrap();
        assert_eq!(loaded.api.model, "gemini-1.5-flash");
        assert_eq!(loaded.reply_count, 5);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
