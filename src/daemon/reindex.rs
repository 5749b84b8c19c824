// src/daemon/reindex.rs
// Re-index curated Markdown into the `chunks` table on daemon startup and
// after every consolidator write, so hybrid search can recall graduated
// knowledge alongside episodes (spec.md §4.3).

use crate::config::Config;
use crate::embed::EmbeddingPipeline;
use crate::store::chunk::replace_chunks_for_path_sync;
use crate::store::types::{Chunk, ChunkLayer};
use crate::store::DatabasePool;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// Split Markdown into chunks on `## ` section boundaries, each chunk carrying
/// its 1-indexed start/end line span within the file.
fn split_into_sections(text: &str) -> Vec<(usize, usize, String)> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut boundaries = vec![0];
    for (i, line) in lines.iter().enumerate().skip(1) {
        if line.starts_with("## ") {
            boundaries.push(i);
        }
    }
    boundaries.push(lines.len());

    let mut sections = Vec::new();
    for w in boundaries.windows(2) {
        let (start, end) = (w[0], w[1]);
        if end <= start {
            continue;
        }
        let text = lines[start..end].join("\n");
        if !text.trim().is_empty() {
            sections.push((start + 1, end, text));
        }
    }
    sections
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn reindex_file(
    pool: &DatabasePool,
    embeddings: &EmbeddingPipeline,
    path: &Path,
    layer: ChunkLayer,
    project: Option<String>,
    now: i64,
) -> anyhow::Result<()> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Ok(()), // file doesn't exist yet; nothing to index
    };

    let sections = split_into_sections(&text);
    let texts: Vec<String> = sections.iter().map(|(_, _, t)| t.clone()).collect();
    let embedded = embeddings.embed_many(&texts, now).await;

    let path_str = path.to_string_lossy().to_string();
    let chunks: Vec<Chunk> = sections
        .into_iter()
        .zip(embedded)
        .enumerate()
        .map(|(i, ((start_line, end_line, text), embedding))| Chunk {
            id: i as i64,
            path: path_str.clone(),
            layer,
            project: project.clone(),
            start_line: start_line as i64,
            end_line: end_line as i64,
            hash: hash_text(&text),
            text,
            embedding,
            updated_at: now,
        })
        .collect();

    let path_for_db = path_str.clone();
    pool.interact(move |conn| {
        replace_chunks_for_path_sync(conn, &path_for_db, &chunks).map_err(anyhow::Error::from)
    })
    .await
}

/// Re-index the global MEMORY.md and every project's curated Markdown known to
/// the project registry. Run once at daemon startup.
pub async fn reindex_all(
    pool: &Arc<DatabasePool>,
    embeddings: &Arc<EmbeddingPipeline>,
    config: &Config,
    now: i64,
) -> anyhow::Result<()> {
    reindex_file(pool, embeddings, &config.global_memory_path(), ChunkLayer::Global, None, now)
        .await?;

    let projects = pool
        .interact(|conn| crate::store::project::all_projects_sync(conn).map_err(anyhow::Error::from))
        .await?;

    for project in projects {
        let path = Config::project_memory_path(Path::new(&project.full_path));
        reindex_file(pool, embeddings, &path, ChunkLayer::Project, Some(project.full_path), now).await?;
    }

    Ok(())
}
