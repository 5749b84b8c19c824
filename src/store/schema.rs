// src/store/schema.rs
// Database schema and migrations (spec.md §3, §4.1)

use anyhow::Result;
use rusqlite::Connection;

/// Schema version this binary expects. Bumped whenever SCHEMA changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL,
    project         TEXT,
    project_path    TEXT,
    scope           TEXT NOT NULL CHECK (scope IN ('global', 'project')),
    summary         TEXT NOT NULL,
    full_content    TEXT,
    entities        TEXT NOT NULL DEFAULT '[]',
    importance      TEXT NOT NULL DEFAULT 'normal' CHECK (importance IN ('high', 'normal')),
    source_type     TEXT NOT NULL DEFAULT 'auto' CHECK (source_type IN ('auto', 'manual')),
    embedding       BLOB,
    created_at      INTEGER NOT NULL,
    accessed_at     INTEGER NOT NULL,
    access_count    INTEGER NOT NULL DEFAULT 0,
    graduated_at    INTEGER
);

CREATE INDEX IF NOT EXISTS idx_episodes_project ON episodes(project);
CREATE INDEX IF NOT EXISTS idx_episodes_scope ON episodes(scope);
CREATE INDEX IF NOT EXISTS idx_episodes_graduation
    ON episodes(importance, access_count, graduated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS episodes_fts USING fts5(
    summary, full_content, entities, content=''
);

CREATE TRIGGER IF NOT EXISTS episodes_fts_insert AFTER INSERT ON episodes BEGIN
    INSERT INTO episodes_fts(rowid, summary, full_content, entities)
    VALUES (new.rowid, new.summary, coalesce(new.full_content, ''), new.entities);
END;

CREATE TRIGGER IF NOT EXISTS episodes_fts_delete AFTER DELETE ON episodes BEGIN
    INSERT INTO episodes_fts(episodes_fts, rowid, summary, full_content, entities)
    VALUES ('delete', old.rowid, old.summary, coalesce(old.full_content, ''), old.entities);
END;

CREATE TRIGGER IF NOT EXISTS episodes_fts_update AFTER UPDATE ON episodes BEGIN
    INSERT INTO episodes_fts(episodes_fts, rowid, summary, full_content, entities)
    VALUES ('delete', old.rowid, old.summary, coalesce(old.full_content, ''), old.entities);
    INSERT INTO episodes_fts(rowid, summary, full_content, entities)
    VALUES (new.rowid, new.summary, coalesce(new.full_content, ''), new.entities);
END;

CREATE TABLE IF NOT EXISTS chunks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    path        TEXT NOT NULL,
    layer       TEXT NOT NULL CHECK (layer IN ('global', 'project')),
    project     TEXT,
    start_line  INTEGER NOT NULL,
    end_line    INTEGER NOT NULL,
    hash        TEXT NOT NULL,
    text        TEXT NOT NULL,
    embedding   BLOB,
    updated_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(text, content='');

CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_delete AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_update AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TABLE IF NOT EXISTS beliefs (
    id                      TEXT PRIMARY KEY,
    statement               TEXT NOT NULL,
    subject                 TEXT,
    predicate               TEXT,
    context                 TEXT,
    confidence_alpha        REAL NOT NULL DEFAULT 1.0,
    confidence_beta         REAL NOT NULL DEFAULT 1.0,
    evidence_count          INTEGER NOT NULL DEFAULT 0,
    supporting_episodes     TEXT NOT NULL DEFAULT '[]',
    contradicting_episodes  TEXT NOT NULL DEFAULT '[]',
    scope                   TEXT NOT NULL CHECK (scope IN ('global', 'project')),
    project                 TEXT,
    project_path            TEXT,
    status                  TEXT NOT NULL DEFAULT 'active'
                                CHECK (status IN ('active', 'demoted', 'retracted')),
    promoted_at             INTEGER,
    demoted_at              INTEGER,
    created_at              INTEGER NOT NULL,
    updated_at              INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_beliefs_status ON beliefs(status);
CREATE INDEX IF NOT EXISTS idx_beliefs_project ON beliefs(project);

CREATE TABLE IF NOT EXISTS projects (
    full_path       TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    description     TEXT,
    source          TEXT NOT NULL DEFAULT 'auto' CHECK (source IN ('auto', 'claude_md', 'manual')),
    parent_project  TEXT,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS embedding_cache (
    hash        TEXT PRIMARY KEY,
    embedding   BLOB NOT NULL,
    dims        INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
"#;

/// Run all schema setup and migrations. Idempotent: safe to call on every startup.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    ensure_schema_version(conn)?;
    Ok(())
}

fn ensure_schema_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
        .ok();

    match existing {
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                [SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        }
        Some(v) => {
            let found: i64 = v.parse().unwrap_or(0);
            if found != SCHEMA_VERSION {
                // Fatal per spec.md §7: schema/version mismatch refuses to start.
                anyhow::bail!(
                    "schema version mismatch: db at {found}, binary expects {SCHEMA_VERSION}"
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        run_all_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'episodes'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn fts_mirrors_episode_rows() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO episodes (id, session_id, scope, summary, entities, created_at, accessed_at)
             VALUES ('ep1', 's1', 'global', 'atomic rename for writes', '[]', 0, 0)",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM episodes_fts WHERE episodes_fts MATCH 'atomic'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM episodes WHERE id = 'ep1'", []).unwrap();
        let hits_after: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM episodes_fts WHERE episodes_fts MATCH 'atomic'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits_after, 0);
    }
}
