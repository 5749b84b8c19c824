// src/store/row.rs
// Shared row <-> type mapping helpers for the sync DB functions.

use super::types::{
    Belief, BeliefStatus, Chunk, ChunkLayer, Episode, Importance, Project, ProjectSource, Scope,
    SourceType,
};
use rusqlite::Row;

pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

pub fn row_to_episode(row: &Row) -> rusqlite::Result<Episode> {
    let scope_str: String = row.get("scope")?;
    let importance_str: String = row.get("importance")?;
    let source_str: String = row.get("source_type")?;
    let entities_str: String = row.get("entities")?;
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;

    Ok(Episode {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        project: row.get("project")?,
        project_path: row.get("project_path")?,
        scope: Scope::from_str_opt(&scope_str).unwrap_or(Scope::Global),
        summary: row.get("summary")?,
        full_content: row.get("full_content")?,
        entities: json_list(&entities_str),
        importance: Importance::from_str_opt(&importance_str).unwrap_or(Importance::Normal),
        source_type: if source_str == "manual" { SourceType::Manual } else { SourceType::Auto },
        embedding: embedding_blob.map(|b| blob_to_embedding(&b)),
        created_at: row.get("created_at")?,
        accessed_at: row.get("accessed_at")?,
        access_count: row.get("access_count")?,
        graduated_at: row.get("graduated_at")?,
    })
}

pub fn row_to_chunk(row: &Row) -> rusqlite::Result<Chunk> {
    let layer_str: String = row.get("layer")?;
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;

    Ok(Chunk {
        id: row.get("id")?,
        path: row.get("path")?,
        layer: ChunkLayer::from_str_opt(&layer_str).unwrap_or(ChunkLayer::Global),
        project: row.get("project")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        hash: row.get("hash")?,
        text: row.get("text")?,
        embedding: embedding_blob.map(|b| blob_to_embedding(&b)),
        updated_at: row.get("updated_at")?,
    })
}

pub fn row_to_belief(row: &Row) -> rusqlite::Result<Belief> {
    let scope_str: String = row.get("scope")?;
    let status_str: String = row.get("status")?;
    let supporting: String = row.get("supporting_episodes")?;
    let contradicting: String = row.get("contradicting_episodes")?;

    Ok(Belief {
        id: row.get("id")?,
        statement: row.get("statement")?,
        subject: row.get("subject")?,
        predicate: row.get("predicate")?,
        context: row.get("context")?,
        confidence_alpha: row.get("confidence_alpha")?,
        confidence_beta: row.get("confidence_beta")?,
        evidence_count: row.get("evidence_count")?,
        supporting_episodes: json_list(&supporting),
        contradicting_episodes: json_list(&contradicting),
        scope: Scope::from_str_opt(&scope_str).unwrap_or(Scope::Global),
        project: row.get("project")?,
        project_path: row.get("project_path")?,
        status: BeliefStatus::from_str_opt(&status_str).unwrap_or(BeliefStatus::Active),
        promoted_at: row.get("promoted_at")?,
        demoted_at: row.get("demoted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let source_str: String = row.get("source")?;
    Ok(Project {
        full_path: row.get("full_path")?,
        name: row.get("name")?,
        description: row.get("description")?,
        source: ProjectSource::from_str_opt(&source_str).unwrap_or(ProjectSource::Auto),
        parent_project: row.get("parent_project")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
