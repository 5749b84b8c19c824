// src/store/pool.rs
// Async connection pool over a single embedded SQLite file (spec.md §4.1).
//
// Preferred pattern: `pool.run(|conn| ...)` for request handlers (maps errors to
// `EngramError::Db`); use `pool.interact(|conn| ...)` when the closure needs to
// return `anyhow::Result` (migrations, background tasks).

use crate::config::DB_BUSY_TIMEOUT;
use crate::error::{EngramError, Result};
use anyhow::Context;
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::Path;

/// Per-connection setup hook: WAL mode, busy timeout, foreign keys on.
fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(DB_BUSY_TIMEOUT)?;
    Ok(())
}

pub struct DatabasePool {
    pool: Pool,
}

impl DatabasePool {
    /// Open (and migrate) the database at `path`. Creates parent directories as
    /// needed. Runs schema migrations synchronously on a dedicated connection
    /// before the pool is handed out, so every subsequent connection sees a fully
    /// migrated schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Run migrations on a single blocking connection first.
        let migrate_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            let conn = Connection::open(&migrate_path)?;
            configure_connection(&conn)?;
            super::schema::run_all_migrations(&conn).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(1),
                    Some(e.to_string()),
                )
            })
        })
        .await
        .map_err(EngramError::from)?
        .map_err(EngramError::Db)?;

        let cfg = Config::new(path);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| EngramError::Config(e.to_string()))?
            .post_create(Hook::async_fn(move |conn, _| {
                Box::pin(async move {
                    conn.interact(|conn| configure_connection(conn))
                        .await
                        .map_err(|e| deadpool_sqlite::HookError::Message(e.to_string().into()))?
                        .map_err(|e| deadpool_sqlite::HookError::Message(e.to_string().into()))
                })
            }))
            .build()
            .context("failed to build sqlite pool")?;

        Ok(Self { pool })
    }

    /// In-memory pool for tests: a shared-cache URI so multiple connections see the
    /// same data (teacher's pattern, `db/pool.rs` doc comment).
    #[cfg(any(test, feature = "test-util"))]
    pub async fn open_memory(tag: &str) -> Result<Self> {
        let cfg = Config::new(format!("file:memdb_{tag}?mode=memory&cache=shared"));
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| EngramError::Config(e.to_string()))?
            .build()
            .context("failed to build in-memory sqlite pool")?;

        let conn = pool.get().await.context("get conn")?;
        conn.interact(|conn| {
            configure_connection(conn)?;
            super::schema::run_all_migrations(conn).map_err(|e| {
                rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some(e.to_string()))
            })
        })
        .await
        .map_err(|e| EngramError::Other(e.to_string()))?
        .map_err(EngramError::Db)?;

        Ok(Self { pool })
    }

    /// Run a sync closure against a pooled connection, mapping errors to `EngramError`.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| EngramError::Other(e.to_string()))?;
        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| EngramError::Other(e.to_string()))?
            .map_err(EngramError::Db)
    }

    /// Run a sync closure returning `anyhow::Result` (migrations, background tasks).
    pub async fn interact<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.context("get pooled connection")?;
        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
    }
}

/// True if a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED (transient; retry next cycle).
pub fn is_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error { code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked, .. },
            _,
        )
    )
}
