// src/store/belief.rs
// Belief CRUD (spec.md §3, §5 belief synthesis/promotion).

use super::row::row_to_belief;
use super::types::{Belief, BeliefStatus};
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_belief_sync(conn: &Connection, b: &Belief) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO beliefs (
            id, statement, subject, predicate, context, confidence_alpha, confidence_beta,
            evidence_count, supporting_episodes, contradicting_episodes, scope, project,
            project_path, status, promoted_at, demoted_at, created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
        params![
            b.id,
            b.statement,
            b.subject,
            b.predicate,
            b.context,
            b.confidence_alpha,
            b.confidence_beta,
            b.evidence_count,
            serde_json::to_string(&b.supporting_episodes).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&b.contradicting_episodes).unwrap_or_else(|_| "[]".into()),
            b.scope.as_str(),
            b.project,
            b.project_path,
            b.status.as_str(),
            b.promoted_at,
            b.demoted_at,
            b.created_at,
            b.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_belief_sync(conn: &Connection, id: &str) -> rusqlite::Result<Option<Belief>> {
    conn.query_row("SELECT * FROM beliefs WHERE id = ?1", params![id], row_to_belief).optional()
}

pub fn active_beliefs_for_scope_sync(
    conn: &Connection,
    scope: &str,
    project: Option<&str>,
) -> rusqlite::Result<Vec<Belief>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM beliefs WHERE status = 'active' AND scope = ?1 AND project IS ?2
         ORDER BY updated_at DESC",
    )?;
    let rows = stmt.query_map(params![scope, project], row_to_belief)?;
    rows.collect()
}

/// Record a new piece of evidence: bump alpha (supporting) or beta (contradicting)
/// by one, per the Beta-distribution update rule (spec.md §5).
pub fn record_evidence_sync(
    conn: &Connection,
    id: &str,
    episode_id: &str,
    supports: bool,
    now: i64,
) -> rusqlite::Result<()> {
    let belief = get_belief_sync(conn, id)?;
    let Some(mut belief) = belief else { return Ok(()) };

    if supports {
        belief.confidence_alpha += 1.0;
        if !belief.supporting_episodes.contains(&episode_id.to_string()) {
            belief.supporting_episodes.push(episode_id.to_string());
        }
    } else {
        belief.confidence_beta += 1.0;
        if !belief.contradicting_episodes.contains(&episode_id.to_string()) {
            belief.contradicting_episodes.push(episode_id.to_string());
        }
    }
    belief.evidence_count += 1;
    belief.updated_at = now;

    conn.execute(
        "UPDATE beliefs SET confidence_alpha = ?2, confidence_beta = ?3, evidence_count = ?4,
            supporting_episodes = ?5, contradicting_episodes = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            id,
            belief.confidence_alpha,
            belief.confidence_beta,
            belief.evidence_count,
            serde_json::to_string(&belief.supporting_episodes).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&belief.contradicting_episodes).unwrap_or_else(|_| "[]".into()),
            now,
        ],
    )?;
    Ok(())
}

pub fn set_status_sync(
    conn: &Connection,
    id: &str,
    status: BeliefStatus,
    now: i64,
) -> rusqlite::Result<()> {
    match status {
        BeliefStatus::Active => {
            conn.execute(
                "UPDATE beliefs SET status = 'active', promoted_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        BeliefStatus::Demoted => {
            conn.execute(
                "UPDATE beliefs SET status = 'demoted', demoted_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        BeliefStatus::Retracted => {
            conn.execute(
                "UPDATE beliefs SET status = 'retracted', updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
    }
    Ok(())
}

/// Distinct project paths that currently have at least one active project-scoped
/// belief, so the consolidator knows which curated files need a belief splice.
pub fn projects_with_active_beliefs_sync(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT project_path FROM beliefs
         WHERE status = 'active' AND scope = 'project' AND project_path IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Beliefs whose evidence count and confidence cross the thresholds needed for a
/// status transition this cycle (evaluated by the consolidator, not here).
pub fn beliefs_with_min_evidence_sync(
    conn: &Connection,
    min_evidence: i64,
) -> rusqlite::Result<Vec<Belief>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM beliefs WHERE evidence_count >= ?1 AND status != 'retracted'",
    )?;
    let rows = stmt.query_map(params![min_evidence], row_to_belief)?;
    rows.collect()
}
