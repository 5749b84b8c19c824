// src/search/hybrid.rs
// Hybrid search: FTS5 lexical candidates over curated-Markdown chunks,
// re-ranked by cosine similarity against the query embedding, fused with a
// temporal decay factor (spec.md §4.3).
//
// Pipeline:
//   1. Tokenize the prompt, join terms with AND, pull the top 3*limit lexical
//      candidates (so the vector re-rank has enough to choose from).
//   2. Restrict to the caller's project family (global layer always included).
//   3. Score each candidate: cosine(query_embedding, chunk.embedding) and the
//      FTS5 bm25 rank, each min-max normalized across the candidate set.
//   4. Fuse: 0.7 * vector_score + 0.3 * lexical_score.
//   5. Apply temporal decay (30-day half-life), except chunks whose path is
//      "evergreen" (basename is MEMORY.md, or doesn't start with a date prefix).
//   6. Optionally diversify (MMR-style) -- off by default (spec.md §9 Open Question).

use crate::embed::cosine;
use crate::store::row::row_to_chunk;
use crate::store::types::Chunk;
use crate::store::DatabasePool;

const EPSILON: f64 = 1e-9;
const DECAY_HALF_LIFE_SECS: f64 = 30.0 * 24.0 * 3600.0;

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

pub struct SearchOptions {
    pub limit: usize,
    pub project_family: Vec<String>,
    pub now: i64,
    pub diversify: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 8, project_family: Vec::new(), now: 0, diversify: false }
    }
}

fn tokenize_for_fts(prompt: &str) -> String {
    let terms: Vec<String> = prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() >= 2)
        .map(|s| format!("\"{}\"", s.replace('"', "")))
        .collect();
    terms.join(" AND ")
}

fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values.iter().map(|v| if range.abs() < EPSILON { 0.0 } else { (v - min) / range }).collect()
}

/// A chunk's path is "evergreen" -- exempt from decay -- if its basename is
/// `MEMORY.md` or doesn't start with a `YYYY-MM-DD` date prefix.
fn is_evergreen_path(path: &str) -> bool {
    let basename = std::path::Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
    basename == "MEMORY.md" || !starts_with_date_prefix(basename)
}

fn starts_with_date_prefix(basename: &str) -> bool {
    let b = basename.as_bytes();
    b.len() >= 10
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
}

fn temporal_decay(chunk: &Chunk, now: i64) -> f64 {
    if is_evergreen_path(&chunk.path) {
        return 1.0;
    }
    let age_secs = (now - chunk.updated_at).max(0) as f64;
    0.5f64.powf(age_secs / DECAY_HALF_LIFE_SECS)
}

pub async fn search_chunks(
    pool: &DatabasePool,
    prompt: &str,
    query_embedding: Option<Vec<f32>>,
    opts: SearchOptions,
) -> anyhow::Result<Vec<ScoredChunk>> {
    let fts_query = tokenize_for_fts(prompt);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let lexical_limit = (opts.limit * 3).max(opts.limit);
    let family = opts.project_family.clone();

    let candidates = pool
        .interact(move |conn| {
            let sql = if family.is_empty() {
                "SELECT c.*, bm25(chunks_fts) AS rank FROM chunks c
                 JOIN chunks_fts ON chunks_fts.rowid = c.rowid
                 WHERE chunks_fts MATCH ?1 AND c.layer = 'global'
                 ORDER BY rank LIMIT ?2"
                    .to_string()
            } else {
                let placeholders = family.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                format!(
                    "SELECT c.*, bm25(chunks_fts) AS rank FROM chunks c
                     JOIN chunks_fts ON chunks_fts.rowid = c.rowid
                     WHERE chunks_fts MATCH ?1
                       AND (c.layer = 'global' OR c.project IN ({placeholders}))
                     ORDER BY rank LIMIT ?{}",
                    family.len() + 2
                )
            };

            let mut stmt = conn.prepare(&sql)?;
            let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&fts_query];
            for f in &family {
                bound.push(f as &dyn rusqlite::ToSql);
            }
            let limit_i64 = lexical_limit as i64;
            bound.push(&limit_i64);

            let rows = stmt.query_map(bound.as_slice(), |row| {
                let chunk = row_to_chunk(row)?;
                let rank: f64 = row.get("rank")?;
                Ok((chunk, rank))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(anyhow::Error::from)
        })
        .await?;

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // bm25() returns lower-is-better; flip sign so "higher is better" holds for
    // both normalized axes.
    let lexical_raw: Vec<f64> = candidates.iter().map(|(_, rank)| -rank).collect();
    let lexical_norm = min_max_normalize(&lexical_raw);

    let vector_raw: Vec<f64> = candidates
        .iter()
        .map(|(c, _)| match (&query_embedding, &c.embedding) {
            (Some(q), Some(e)) => cosine(q, e) as f64,
            _ => 0.0,
        })
        .collect();
    let vector_norm = min_max_normalize(&vector_raw);

    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, (chunk, _))| {
            let fused = 0.7 * vector_norm[i] + 0.3 * lexical_norm[i];
            let decay = temporal_decay(&chunk, opts.now);
            ScoredChunk { score: fused * decay, chunk }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if opts.diversify {
        scored = diversify(scored, opts.limit);
    } else {
        scored.truncate(opts.limit);
    }

    Ok(scored)
}

/// Maximal-marginal-relevance style re-rank: greedily pick the highest scoring
/// chunk, then penalize remaining candidates by their similarity to what's
/// already picked so near-duplicate chunks don't crowd out diverse recall.
/// Off by default (spec.md §9 Open Question); callers opt in explicitly.
fn diversify(candidates: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    const LAMBDA: f64 = 0.7;
    let mut pool = candidates;
    let mut picked: Vec<ScoredChunk> = Vec::with_capacity(limit);

    while !pool.is_empty() && picked.len() < limit {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, cand) in pool.iter().enumerate() {
            let max_sim = picked
                .iter()
                .filter_map(|p| match (&p.chunk.embedding, &cand.chunk.embedding) {
                    (Some(a), Some(b)) => Some(cosine(a, b) as f64),
                    _ => None,
                })
                .fold(0.0, f64::max);
            let mmr = LAMBDA * cand.score - (1.0 - LAMBDA) * max_sim;
            if mmr > best_score {
                best_score = mmr;
                best_idx = i;
            }
        }
        picked.push(pool.remove(best_idx));
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::ChunkLayer;

    #[test]
    fn tokenizer_drops_short_tokens_and_joins_with_and() {
        let q = tokenize_for_fts("how do I fix the tokio timeout bug?");
        assert!(q.contains("AND"));
        assert!(q.contains("\"tokio\""));
        assert!(!q.contains("\"do\"")); // 2-char token kept; "I" (1 char) dropped below
    }

    #[test]
    fn normalize_handles_constant_input() {
        let v = min_max_normalize(&[0.5, 0.5, 0.5]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    fn chunk(path: &str) -> Chunk {
        Chunk {
            id: 1,
            path: path.to_string(),
            layer: ChunkLayer::Global,
            project: None,
            start_line: 1,
            end_line: 1,
            hash: "h".into(),
            text: "x".into(),
            embedding: None,
            updated_at: 0,
        }
    }

    #[test]
    fn memory_md_is_evergreen_regardless_of_age() {
        assert_eq!(temporal_decay(&chunk("/home/.claude-mem/MEMORY.md"), 10_000_000), 1.0);
    }

    #[test]
    fn a_non_dated_project_path_is_evergreen() {
        assert_eq!(temporal_decay(&chunk("/repo/.claude/memory/MEMORY.md"), 10_000_000), 1.0);
    }

    #[test]
    fn a_dated_archive_path_decays_with_age() {
        let decayed = temporal_decay(&chunk("/home/.claude-mem/memory/2024-01-01.md"), 10_000_000);
        assert!(decayed < 1.0);
    }
}
