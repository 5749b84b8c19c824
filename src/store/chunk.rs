// src/store/chunk.rs
// Chunk CRUD: windowed slices of curated Markdown, re-indexed on daemon startup
// and whenever a curated file is rewritten by the consolidator (spec.md §4.3).

use super::row::{embedding_to_blob, row_to_chunk};
use super::types::Chunk;
use rusqlite::{params, Connection};

pub fn replace_chunks_for_path_sync(
    conn: &Connection,
    path: &str,
    chunks: &[Chunk],
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
    for c in chunks {
        conn.execute(
            "INSERT INTO chunks (path, layer, project, start_line, end_line, hash, text, embedding, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                c.path,
                c.layer.as_str(),
                c.project,
                c.start_line,
                c.end_line,
                c.hash,
                c.text,
                c.embedding.as_deref().map(embedding_to_blob),
                c.updated_at,
            ],
        )?;
    }
    Ok(())
}

pub fn chunks_for_project_sync(
    conn: &Connection,
    project_families: &[String],
) -> rusqlite::Result<Vec<Chunk>> {
    if project_families.is_empty() {
        let mut stmt = conn.prepare("SELECT * FROM chunks WHERE layer = 'global'")?;
        let rows = stmt.query_map([], row_to_chunk)?;
        return rows.collect();
    }
    let placeholders = project_families.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT * FROM chunks WHERE layer = 'global' OR project IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> =
        project_families.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), row_to_chunk)?;
    rows.collect()
}

pub fn delete_chunks_for_path_sync(conn: &Connection, path: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
    Ok(())
}
