// src/store/project.rs
// Project registry CRUD (spec.md §4.4 resolution & family graph).

use super::row::row_to_project;
use super::types::{Project, ProjectSource};
use rusqlite::{params, Connection, OptionalExtension};

/// Insert or update a project, preferring to keep an existing manual/claude_md
/// classification over a later auto-inferred one.
pub fn upsert_project_sync(
    conn: &Connection,
    full_path: &str,
    name: &str,
    source: ProjectSource,
    parent_project: Option<&str>,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO projects (full_path, name, source, parent_project, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(full_path) DO UPDATE SET
            name = excluded.name,
            source = CASE
                WHEN projects.source = 'manual' THEN projects.source
                WHEN projects.source = 'claude_md' AND excluded.source = 'auto' THEN projects.source
                ELSE excluded.source
            END,
            parent_project = COALESCE(excluded.parent_project, projects.parent_project),
            updated_at = ?5",
        params![full_path, name, source.as_str(), parent_project, now],
    )?;
    Ok(())
}

pub fn get_project_sync(conn: &Connection, full_path: &str) -> rusqlite::Result<Option<Project>> {
    conn.query_row("SELECT * FROM projects WHERE full_path = ?1", params![full_path], row_to_project)
        .optional()
}

pub fn all_projects_sync(conn: &Connection) -> rusqlite::Result<Vec<Project>> {
    let mut stmt = conn.prepare("SELECT * FROM projects")?;
    let rows = stmt.query_map([], row_to_project)?;
    rows.collect()
}

pub fn set_parent_sync(
    conn: &Connection,
    full_path: &str,
    parent_project: Option<&str>,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE projects SET parent_project = ?2, updated_at = ?3 WHERE full_path = ?1",
        params![full_path, parent_project, now],
    )?;
    Ok(())
}
