// src/extract/mod.rs
// Extractor (spec.md §4.5): turns a batch of new transcript messages into
// candidate episodes via an LLM call, then dedup-upserts each candidate against
// a snapshot of existing episodes taken once per batch.

pub mod llm;

use crate::config::DEDUP_SIMILARITY_THRESHOLD;
use crate::daemon::health::DaemonMetrics;
use crate::embed::{cosine, EmbeddingPipeline};
use crate::store::episode::{dedup_candidates_sync, insert_episode_sync, merge_into_episode_sync};
use crate::store::types::{Episode, Importance, Scope, SourceType};
use crate::store::DatabasePool;
use llm::{ChatClient, EXTRACTION_SYSTEM_PROMPT};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
struct ExtractedCandidate {
    summary: String,
    #[serde(default)]
    full_content: Option<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    importance: Option<String>,
    /// Accepted for wire compatibility; actual scope is derived from the
    /// batch's project attribution to preserve the scope/project invariant
    /// (spec.md §8), not from the model's own judgment.
    #[serde(default)]
    #[allow(dead_code)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ExtractionResponse {
    #[serde(default)]
    memories: Vec<ExtractedCandidate>,
    #[serde(default, rename = "updatedSummary")]
    updated_summary: Option<String>,
}

pub struct ExtractionInput {
    pub session_id: String,
    pub project: Option<String>,
    pub project_path: Option<String>,
    pub rolling_summary: String,
    pub new_messages: Vec<String>,
}

/// Outcome of one extraction batch: how many candidates were stored/merged,
/// and the LLM's updated rolling summary (callers persist it onto session
/// state so the next batch's prompt stays bounded in size).
pub struct ExtractionOutcome {
    pub stored: usize,
    pub updated_summary: Option<String>,
}

pub struct Extractor {
    pool: Arc<DatabasePool>,
    embeddings: Arc<EmbeddingPipeline>,
    chat: Arc<ChatClient>,
    metrics: Arc<DaemonMetrics>,
}

impl Extractor {
    pub fn new(
        pool: Arc<DatabasePool>,
        embeddings: Arc<EmbeddingPipeline>,
        chat: Arc<ChatClient>,
        metrics: Arc<DaemonMetrics>,
    ) -> Self {
        Self { pool, embeddings, chat, metrics }
    }

    pub async fn extract_and_store(
        &self,
        input: ExtractionInput,
        now: i64,
    ) -> anyhow::Result<ExtractionOutcome> {
        let prompt = build_prompt(&input.rolling_summary, &input.new_messages);
        let completion = match self.chat.complete(EXTRACTION_SYSTEM_PROMPT, prompt).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "extraction LLM call failed, skipping batch");
                return Ok(ExtractionOutcome { stored: 0, updated_summary: None });
            }
        };

        let response = parse_response(&completion);
        let updated_summary = response.updated_summary.clone();
        let candidates = response.memories;
        if candidates.is_empty() {
            return Ok(ExtractionOutcome { stored: 0, updated_summary });
        }

        let scope = if input.project.is_some() { Scope::Project } else { Scope::Global };
        let pool = self.pool.clone();
        let scope_str = scope.as_str().to_string();
        let project_for_snapshot = input.project.clone();

        // Snapshot dedup candidates once per batch so concurrent inserts within
        // this batch can't dedup against each other (spec.md §4.5).
        let snapshot = pool
            .interact({
                let project = project_for_snapshot.clone();
                move |conn| {
                    dedup_candidates_sync(conn, &scope_str, project.as_deref())
                        .map_err(anyhow::Error::from)
                }
            })
            .await?;

        let summaries: Vec<String> = candidates.iter().map(|c| c.summary.clone()).collect();
        let embeddings = self.embeddings.embed_many(&summaries, now).await;

        let mut stored = 0;
        for (candidate, embedding) in candidates.into_iter().zip(embeddings.into_iter()) {
            // An embedding failure means this candidate is dropped entirely --
            // no episode is created without one (spec.md §4.5 step 5).
            let Some(embedding) = embedding else {
                warn!("embedding failed for extracted candidate, skipping");
                continue;
            };
            let merged_into = find_dedup_match(&snapshot, &embedding);

            let pool = self.pool.clone();
            match merged_into {
                Some(existing_id) => {
                    let summary = candidate.summary.clone();
                    let entities = candidate.entities.clone();
                    pool.interact(move |conn| {
                        merge_into_episode_sync(conn, &existing_id, &summary, &entities, now)
                            .map_err(anyhow::Error::from)
                    })
                    .await?;
                }
                None => {
                    let episode = Episode {
                        id: Uuid::new_v4().to_string(),
                        session_id: input.session_id.clone(),
                        project: input.project.clone(),
                        project_path: input.project_path.clone(),
                        scope,
                        summary: candidate.summary,
                        full_content: candidate.full_content,
                        entities: candidate.entities,
                        importance: match candidate.importance.as_deref() {
                            Some("high") => Importance::High,
                            _ => Importance::Normal,
                        },
                        source_type: SourceType::Auto,
                        embedding: Some(embedding),
                        created_at: now,
                        accessed_at: now,
                        access_count: 0,
                        graduated_at: None,
                    };
                    pool.interact(move |conn| {
                        insert_episode_sync(conn, &episode).map_err(anyhow::Error::from)
                    })
                    .await?;
                }
            }
            stored += 1;
        }

        self.metrics.episodes_extracted.fetch_add(stored as u64, std::sync::atomic::Ordering::Relaxed);

        Ok(ExtractionOutcome { stored, updated_summary })
    }
}

/// Truncate to at most `max_chars` Unicode scalar values, never splitting a
/// multi-byte character (spec.md §8 boundary behavior).
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn build_prompt(rolling_summary: &str, new_messages: &[String]) -> String {
    let truncated: Vec<String> =
        new_messages.iter().map(|m| truncate_chars(m, MAX_MESSAGE_CHARS)).collect();

    format!(
        "Rolling summary so far:\n{rolling_summary}\n\nNew messages:\n{}",
        truncated.join("\n---\n")
    )
}

fn parse_response(completion: &str) -> ExtractionResponse {
    let trimmed = completion.trim();
    let json_slice = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<ExtractionResponse>(json_slice) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "extraction response was not valid JSON, discarding batch");
            ExtractionResponse::default()
        }
    }
}

fn find_dedup_match(snapshot: &[Episode], candidate_embedding: &[f32]) -> Option<String> {
    snapshot
        .iter()
        .filter_map(|ep| {
            let existing = ep.embedding.as_ref()?;
            let sim = cosine(existing, candidate_embedding);
            (sim > DEDUP_SIMILARITY_THRESHOLD).then_some((ep.id.clone(), sim))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_handles_fenced_json() {
        let raw = "```json\n{\"memories\": [{\"summary\": \"uses pnpm\", \"entities\": [\"pnpm\"]}], \
\"updatedSummary\": \"discussed package manager\"}\n```";
        let parsed = parse_response(raw);
        assert_eq!(parsed.memories.len(), 1);
        assert_eq!(parsed.memories[0].summary, "uses pnpm");
        assert_eq!(parsed.updated_summary.as_deref(), Some("discussed package manager"));
    }

    #[test]
    fn parse_response_returns_empty_on_garbage() {
        assert!(parse_response("not json at all").memories.is_empty());
    }

    #[test]
    fn truncate_chars_never_splits_a_multibyte_character() {
        let s = "a".repeat(5) + "é€";
        let truncated = truncate_chars(&s, 3);
        assert!(truncated.is_char_boundary(truncated.len()));
        assert_eq!(truncated, "aaa...");
    }

    #[test]
    fn find_dedup_match_picks_highest_similarity_above_threshold() {
        let snapshot = vec![
            Episode {
                id: "low".into(),
                session_id: "s".into(),
                project: None,
                project_path: None,
                scope: Scope::Global,
                summary: "x".into(),
                full_content: None,
                entities: vec![],
                importance: Importance::Normal,
                source_type: SourceType::Auto,
                embedding: Some(vec![1.0, 0.0]),
                created_at: 0,
                accessed_at: 0,
                access_count: 0,
                graduated_at: None,
            },
            Episode {
                id: "high".into(),
                session_id: "s".into(),
                project: None,
                project_path: None,
                scope: Scope::Global,
                summary: "y".into(),
                full_content: None,
                entities: vec![],
                importance: Importance::Normal,
                source_type: SourceType::Auto,
                embedding: Some(vec![0.999, 0.001]),
                created_at: 0,
                accessed_at: 0,
                access_count: 0,
                graduated_at: None,
            },
        ];
        let found = find_dedup_match(&snapshot, &[1.0, 0.0]);
        assert_eq!(found, Some("low".to_string()));
    }
}
