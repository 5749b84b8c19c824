// src/store/meta.rs
// Small key/value bookkeeping table: schema version, last-consolidation timestamp,
// embedding provider in use, etc.

use rusqlite::{params, Connection, OptionalExtension};

pub fn get_sync(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| r.get(0)).optional()
}

pub fn set_sync(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}
