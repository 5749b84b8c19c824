// src/store/episode.rs
// Episode CRUD and dedup-upsert (spec.md §3, §4.5).

use super::row::{embedding_to_blob, row_to_episode};
use super::types::Episode;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_episode_sync(conn: &Connection, ep: &Episode) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO episodes (
            id, session_id, project, project_path, scope, summary, full_content,
            entities, importance, source_type, embedding, created_at, accessed_at,
            access_count, graduated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        params![
            ep.id,
            ep.session_id,
            ep.project,
            ep.project_path,
            ep.scope.as_str(),
            ep.summary,
            ep.full_content,
            serde_json::to_string(&ep.entities).unwrap_or_else(|_| "[]".into()),
            ep.importance.as_str(),
            ep.source_type.as_str(),
            ep.embedding.as_deref().map(embedding_to_blob),
            ep.created_at,
            ep.accessed_at,
            ep.access_count,
            ep.graduated_at,
        ],
    )?;
    Ok(())
}

pub fn get_episode_sync(conn: &Connection, id: &str) -> rusqlite::Result<Option<Episode>> {
    conn.query_row("SELECT * FROM episodes WHERE id = ?1", params![id], row_to_episode).optional()
}

/// Candidates eligible for dedup comparison against a new episode: same scope/project,
/// snapshotted once per extraction batch so concurrent inserts within a batch can't
/// dedup against each other (spec.md §4.5).
pub fn dedup_candidates_sync(
    conn: &Connection,
    scope: &str,
    project: Option<&str>,
) -> rusqlite::Result<Vec<Episode>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM episodes WHERE scope = ?1 AND project IS ?2 AND embedding IS NOT NULL
         ORDER BY created_at DESC LIMIT 500",
    )?;
    let rows = stmt.query_map(params![scope, project], row_to_episode)?;
    rows.collect()
}

/// Merge a newly extracted episode into an existing one that matched the dedup
/// threshold: widen entities, bump access bookkeeping, optionally replace summary
/// when the incoming candidate is more detailed.
pub fn merge_into_episode_sync(
    conn: &Connection,
    existing_id: &str,
    new_summary: &str,
    new_entities: &[String],
    now: i64,
) -> rusqlite::Result<()> {
    let existing_entities: String = conn.query_row(
        "SELECT entities FROM episodes WHERE id = ?1",
        params![existing_id],
        |r| r.get(0),
    )?;
    let mut merged: Vec<String> = serde_json::from_str(&existing_entities).unwrap_or_default();
    for e in new_entities {
        if !merged.contains(e) {
            merged.push(e.clone());
        }
    }

    conn.execute(
        "UPDATE episodes SET
            summary = CASE WHEN length(?2) > length(summary) THEN ?2 ELSE summary END,
            entities = ?3,
            accessed_at = ?4,
            access_count = access_count + 1
         WHERE id = ?1",
        params![
            existing_id,
            new_summary,
            serde_json::to_string(&merged).unwrap_or_else(|_| "[]".into()),
            now,
        ],
    )?;
    Ok(())
}

pub fn touch_episode_sync(conn: &Connection, id: &str, now: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE episodes SET accessed_at = ?2, access_count = access_count + 1 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

pub fn mark_graduated_sync(conn: &Connection, id: &str, now: i64) -> rusqlite::Result<()> {
    conn.execute("UPDATE episodes SET graduated_at = ?2 WHERE id = ?1", params![id, now])?;
    Ok(())
}

/// Null out full_content for episodes last accessed before `cutoff` that still carry
/// it, to shrink the on-disk footprint once an episode has aged out of active recall.
pub fn compress_stale_sync(conn: &Connection, cutoff: i64) -> rusqlite::Result<usize> {
    let n = conn.execute(
        "UPDATE episodes SET full_content = NULL
         WHERE full_content IS NOT NULL AND accessed_at < ?1",
        params![cutoff],
    )?;
    Ok(n)
}

/// Graduation candidates (spec.md §4.7): two distinct high-importance sets --
/// frequently accessed, and old enough to risk cold-start loss -- merged and
/// deduped by id, then capped at `emit_limit`.
pub fn graduation_candidates_sync(
    conn: &Connection,
    now: i64,
    min_access_count: i64,
    access_limit: usize,
    cold_start_after_secs: i64,
    cold_start_limit: usize,
    emit_limit: usize,
) -> rusqlite::Result<Vec<Episode>> {
    let mut access_stmt = conn.prepare(
        "SELECT * FROM episodes
         WHERE graduated_at IS NULL AND importance = 'high' AND access_count >= ?1
         ORDER BY access_count DESC, created_at DESC
         LIMIT ?2",
    )?;
    let access_based: Vec<Episode> = access_stmt
        .query_map(params![min_access_count, access_limit as i64], row_to_episode)?
        .collect::<rusqlite::Result<_>>()?;

    let mut cold_start_stmt = conn.prepare(
        "SELECT * FROM episodes
         WHERE graduated_at IS NULL AND importance = 'high' AND scope = 'global'
           AND created_at < ?1
         ORDER BY created_at ASC
         LIMIT ?2",
    )?;
    let cold_start: Vec<Episode> = cold_start_stmt
        .query_map(params![now - cold_start_after_secs, cold_start_limit as i64], row_to_episode)?
        .collect::<rusqlite::Result<_>>()?;

    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for ep in access_based.into_iter().chain(cold_start) {
        if seen.insert(ep.id.clone()) {
            merged.push(ep);
        }
    }
    merged.truncate(emit_limit);
    Ok(merged)
}

/// Episodes processed since the belief-synthesis checkpoint, oldest first
/// (spec.md §4.7 belief synthesis). Only embedded episodes are eligible --
/// clustering is similarity-based.
pub fn episodes_since_sync(
    conn: &Connection,
    since_created_at: i64,
    limit: usize,
) -> rusqlite::Result<Vec<Episode>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM episodes WHERE created_at > ?1 AND embedding IS NOT NULL
         ORDER BY created_at ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since_created_at, limit as i64], row_to_episode)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::run_all_migrations;
    use crate::store::types::{Importance, Scope, SourceType};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        conn
    }

    fn sample(id: &str) -> Episode {
        Episode {
            id: id.into(),
            session_id: "s1".into(),
            project: None,
            project_path: None,
            scope: Scope::Global,
            summary: "uses tokio for async".into(),
            full_content: None,
            entities: vec!["tokio".into()],
            importance: Importance::Normal,
            source_type: SourceType::Auto,
            embedding: Some(vec![0.1, 0.2, 0.3]),
            created_at: 1,
            accessed_at: 1,
            access_count: 0,
            graduated_at: None,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let conn = test_conn();
        let ep = sample("ep1");
        insert_episode_sync(&conn, &ep).unwrap();
        let fetched = get_episode_sync(&conn, "ep1").unwrap().unwrap();
        assert_eq!(fetched.summary, ep.summary);
        assert_eq!(fetched.embedding, ep.embedding);
    }

    #[test]
    fn merge_widens_entities_and_bumps_access() {
        let conn = test_conn();
        insert_episode_sync(&conn, &sample("ep1")).unwrap();
        merge_into_episode_sync(&conn, "ep1", "short", &["serde".to_string()], 5).unwrap();
        let fetched = get_episode_sync(&conn, "ep1").unwrap().unwrap();
        assert!(fetched.entities.contains(&"serde".to_string()));
        assert!(fetched.entities.contains(&"tokio".to_string()));
        assert_eq!(fetched.access_count, 1);
    }

    #[test]
    fn compress_only_touches_stale_rows() {
        let conn = test_conn();
        let mut ep = sample("ep1");
        ep.full_content = Some("detail".into());
        ep.accessed_at = 1;
        insert_episode_sync(&conn, &ep).unwrap();
        let n = compress_stale_sync(&conn, 10).unwrap();
        assert_eq!(n, 1);
        let fetched = get_episode_sync(&conn, "ep1").unwrap().unwrap();
        assert!(fetched.full_content.is_none());
    }
}
