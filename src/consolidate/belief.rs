// src/consolidate/belief.rs
// Belief synthesis and promotion/demotion (spec.md §5): episodes sharing a
// subject/predicate accumulate Beta-distribution evidence on a belief; once a
// belief clears BELIEF_MIN_EVIDENCE, its point confidence decides promotion
// (written into the curated Markdown with a sentinel marker) or demotion.

use crate::config::{
    BELIEF_CLUSTER_SIMILARITY, BELIEF_DEMOTE_CONFIDENCE, BELIEF_MIN_CLUSTER_SIZE,
    BELIEF_MIN_EVIDENCE, BELIEF_PROMOTE_CONFIDENCE, BELIEF_SYNTHESIS_BATCH_LIMIT,
};
use crate::embed::cosine;
use crate::extract::llm::{ChatClient, BELIEF_SYNTHESIS_SYSTEM_PROMPT};
use crate::store::belief::{beliefs_with_min_evidence_sync, insert_belief_sync, record_evidence_sync, set_status_sync};
use crate::store::episode::episodes_since_sync;
use crate::store::meta;
use crate::store::types::{Belief, BeliefStatus, Episode, Scope};
use crate::store::DatabasePool;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub const BELIEFS_BEGIN_MARKER: &str = "<!-- ENGRAM:BELIEFS:BEGIN -->";
pub const BELIEFS_END_MARKER: &str = "<!-- ENGRAM:BELIEFS:END -->";

/// `meta` key holding the `created_at` of the most recently processed episode,
/// so each synthesis cycle only looks at episodes newer than the last one.
pub const SYNTHESIS_CHECKPOINT_KEY: &str = "belief_synthesis_checkpoint";

#[derive(Debug, Deserialize)]
struct SynthesizedBelief {
    statement: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    predicate: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    supporting: Vec<String>,
    #[serde(default)]
    contradicting: Vec<String>,
}

/// Cluster unconsolidated episodes and synthesize a belief per cluster
/// (spec.md §4.7 C7). Advances the synthesis checkpoint to the newest episode
/// considered this cycle regardless of whether it ended up clustered, so a
/// handful of sparse singleton episodes can't stall the checkpoint forever.
/// Returns the newly created beliefs.
pub async fn synthesize(pool: &DatabasePool, chat: &Arc<ChatClient>, now: i64) -> anyhow::Result<Vec<Belief>> {
    let checkpoint: i64 = pool
        .interact(|conn| meta::get_sync(conn, SYNTHESIS_CHECKPOINT_KEY).map_err(anyhow::Error::from))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let episodes = pool
        .interact(move |conn| {
            episodes_since_sync(conn, checkpoint, BELIEF_SYNTHESIS_BATCH_LIMIT).map_err(anyhow::Error::from)
        })
        .await?;

    if episodes.is_empty() {
        return Ok(Vec::new());
    }

    let new_checkpoint = episodes.iter().map(|e| e.created_at).max().unwrap_or(checkpoint);
    let clusters = cluster_by_similarity(&episodes);

    let mut created = Vec::new();
    for cluster in clusters {
        if cluster.len() < BELIEF_MIN_CLUSTER_SIZE {
            continue;
        }
        match synthesize_cluster(pool, chat, &cluster, now).await {
            Ok(Some(belief)) => created.push(belief),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "belief synthesis call failed for a cluster"),
        }
    }

    let new_checkpoint_str = new_checkpoint.to_string();
    pool.interact(move |conn| {
        meta::set_sync(conn, SYNTHESIS_CHECKPOINT_KEY, &new_checkpoint_str).map_err(anyhow::Error::from)
    })
    .await?;

    Ok(created)
}

/// Greedy single-link clustering: each episode either joins the first existing
/// cluster whose seed it clears `BELIEF_CLUSTER_SIMILARITY` against, or starts
/// a new one.
fn cluster_by_similarity(episodes: &[Episode]) -> Vec<Vec<Episode>> {
    let mut clusters: Vec<Vec<Episode>> = Vec::new();

    for ep in episodes {
        let Some(embedding) = &ep.embedding else { continue };
        let joined = clusters.iter_mut().find(|cluster| {
            cluster[0].embedding.as_ref().is_some_and(|seed| cosine(seed, embedding) > BELIEF_CLUSTER_SIMILARITY)
        });
        match joined {
            Some(cluster) => cluster.push(ep.clone()),
            None => clusters.push(vec![ep.clone()]),
        }
    }

    clusters
}

async fn synthesize_cluster(
    pool: &DatabasePool,
    chat: &Arc<ChatClient>,
    cluster: &[Episode],
    now: i64,
) -> anyhow::Result<Option<Belief>> {
    let prompt = build_synthesis_prompt(cluster);
    let completion = chat.complete(BELIEF_SYNTHESIS_SYSTEM_PROMPT, prompt).await?;
    let Some(synthesized) = parse_synthesis_response(&completion) else {
        return Ok(None);
    };

    let cluster_ids: std::collections::HashSet<&str> = cluster.iter().map(|e| e.id.as_str()).collect();
    let supporting: Vec<String> =
        synthesized.supporting.into_iter().filter(|id| cluster_ids.contains(id.as_str())).collect();
    let contradicting: Vec<String> =
        synthesized.contradicting.into_iter().filter(|id| cluster_ids.contains(id.as_str())).collect();

    // A belief scoped to a project inherits that project from its cluster; a
    // cluster spanning scopes defaults to global (spec.md §8 scope invariant).
    let seed = &cluster[0];
    let (scope, project, project_path) = if cluster.iter().all(|e| e.scope == Scope::Project) {
        (Scope::Project, seed.project.clone(), seed.project_path.clone())
    } else {
        (Scope::Global, None, None)
    };

    let belief = Belief {
        id: Uuid::new_v4().to_string(),
        statement: synthesized.statement,
        subject: synthesized.subject,
        predicate: synthesized.predicate,
        context: synthesized.context,
        confidence_alpha: 1.0,
        confidence_beta: 1.0,
        evidence_count: 0,
        supporting_episodes: vec![],
        contradicting_episodes: vec![],
        scope,
        project,
        project_path,
        status: BeliefStatus::Active,
        promoted_at: None,
        demoted_at: None,
        created_at: now,
        updated_at: now,
    };

    let belief_for_insert = belief.clone();
    pool.interact(move |conn| insert_belief_sync(conn, &belief_for_insert).map_err(anyhow::Error::from))
        .await?;

    let belief_id = belief.id.clone();
    for episode_id in supporting {
        let id = belief_id.clone();
        pool.interact(move |conn| {
            record_evidence_sync(conn, &id, &episode_id, true, now).map_err(anyhow::Error::from)
        })
        .await?;
    }
    for episode_id in contradicting {
        let id = belief_id.clone();
        pool.interact(move |conn| {
            record_evidence_sync(conn, &id, &episode_id, false, now).map_err(anyhow::Error::from)
        })
        .await?;
    }

    Ok(Some(belief))
}

fn build_synthesis_prompt(cluster: &[Episode]) -> String {
    let entries: Vec<String> =
        cluster.iter().map(|e| format!("- [{}] {}", e.id, e.summary)).collect();
    format!("Episodes:\n{}", entries.join("\n"))
}

fn parse_synthesis_response(completion: &str) -> Option<SynthesizedBelief> {
    let trimmed = completion.trim();
    let json_slice = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str(json_slice) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "belief synthesis response was not valid JSON, discarding cluster");
            None
        }
    }
}

/// Evaluate every belief with enough evidence and apply promotion/demotion
/// transitions. Returns the beliefs that changed status this cycle.
pub async fn evaluate_transitions(pool: &DatabasePool, now: i64) -> anyhow::Result<Vec<Belief>> {
    let candidates = pool
        .interact(move |conn| {
            beliefs_with_min_evidence_sync(conn, BELIEF_MIN_EVIDENCE as i64).map_err(anyhow::Error::from)
        })
        .await?;

    let mut changed = Vec::new();
    for belief in candidates {
        let confidence = belief.confidence();
        let next_status = match belief.status {
            BeliefStatus::Active if confidence < BELIEF_DEMOTE_CONFIDENCE => Some(BeliefStatus::Demoted),
            BeliefStatus::Demoted if confidence >= BELIEF_PROMOTE_CONFIDENCE => Some(BeliefStatus::Active),
            _ => None,
        };

        if let Some(status) = next_status {
            let id = belief.id.clone();
            pool.interact(move |conn| set_status_sync(conn, &id, status, now).map_err(anyhow::Error::from))
                .await?;
            let mut updated = belief;
            updated.status = status;
            changed.push(updated);
        }
    }

    Ok(changed)
}

/// Render the active beliefs section that replaces the sentinel-marked block in
/// a curated Markdown file. Beliefs outside the markers (hand-written prose) are
/// left untouched by the caller.
pub fn render_beliefs_section(beliefs: &[Belief]) -> String {
    let mut out = String::new();
    out.push_str(BELIEFS_BEGIN_MARKER);
    out.push('\n');
    for b in beliefs.iter().filter(|b| b.status == BeliefStatus::Active) {
        out.push_str(&format!("- {} (confidence: {:.2})\n", b.statement, b.confidence()));
    }
    out.push_str(BELIEFS_END_MARKER);
    out.push('\n');
    out
}

/// Replace the sentinel-marked belief section inside `markdown`, or append one
/// if no markers are present yet.
pub fn splice_beliefs_section(markdown: &str, rendered: &str) -> String {
    match (markdown.find(BELIEFS_BEGIN_MARKER), markdown.find(BELIEFS_END_MARKER)) {
        (Some(start), Some(end)) if end > start => {
            let end_of_marker = end + BELIEFS_END_MARKER.len();
            format!("{}{}{}", &markdown[..start], rendered, &markdown[end_of_marker..])
        }
        _ => format!("{markdown}\n{rendered}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Scope;

    fn belief(confidence_alpha: f64, confidence_beta: f64, status: BeliefStatus) -> Belief {
        Belief {
            id: "b1".into(),
            statement: "uses tokio".into(),
            subject: None,
            predicate: None,
            context: None,
            confidence_alpha,
            confidence_beta,
            evidence_count: 5,
            supporting_episodes: vec![],
            contradicting_episodes: vec![],
            scope: Scope::Global,
            project: None,
            project_path: None,
            status,
            promoted_at: None,
            demoted_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn splice_replaces_existing_markers() {
        let md = format!("# Title\n{BELIEFS_BEGIN_MARKER}\nold\n{BELIEFS_END_MARKER}\nfooter");
        let replaced = splice_beliefs_section(&md, "new-section");
        assert!(replaced.contains("new-section"));
        assert!(!replaced.contains("old"));
        assert!(replaced.contains("footer"));
    }

    #[test]
    fn splice_appends_when_markers_absent() {
        let md = "# Title\nbody";
        let replaced = splice_beliefs_section(md, "new-section");
        assert!(replaced.starts_with("# Title\nbody"));
        assert!(replaced.contains("new-section"));
    }

    #[test]
    fn render_only_includes_active_beliefs() {
        let beliefs = vec![belief(8.0, 2.0, BeliefStatus::Active), belief(1.0, 9.0, BeliefStatus::Demoted)];
        let rendered = render_beliefs_section(&beliefs);
        assert_eq!(rendered.matches("uses tokio").count(), 1);
    }
}
