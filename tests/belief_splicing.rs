// Regression coverage for the consolidation cycle's belief-section splice
// (spec.md §5): a belief that crosses its evidence and confidence thresholds
// gets promoted and written into the curated Markdown file's sentinel-marked
// section, leaving the rest of the file untouched.
#![cfg(feature = "test-util")]

use engram::config::Config;
use engram::consolidate::belief::{BELIEFS_BEGIN_MARKER, BELIEFS_END_MARKER};
use engram::consolidate::Consolidator;
use engram::daemon::health::DaemonMetrics;
use engram::store::belief::insert_belief_sync;
use engram::store::types::{Belief, BeliefStatus, Scope};
use engram::store::DatabasePool;
use std::sync::Arc;

fn demoted_belief() -> Belief {
    Belief {
        id: "b1".to_string(),
        statement: "the project uses pnpm, not npm".to_string(),
        subject: Some("package manager".to_string()),
        predicate: Some("is".to_string()),
        context: None,
        confidence_alpha: 8.0,
        confidence_beta: 2.0,
        evidence_count: 5,
        supporting_episodes: vec!["ep1".to_string(), "ep2".to_string()],
        contradicting_episodes: vec![],
        scope: Scope::Global,
        project: None,
        project_path: None,
        status: BeliefStatus::Demoted,
        promoted_at: None,
        demoted_at: Some(1),
        created_at: 1,
        updated_at: 1,
    }
}

#[tokio::test]
async fn a_promoted_belief_is_spliced_into_the_curated_file_without_disturbing_prose() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        home: dir.path().to_path_buf(),
        project_roots: Vec::new(),
        api_keys: Default::default(),
        rss_budget_bytes: 1,
    });

    std::fs::write(
        config.global_memory_path(),
        format!(
            "# Memory\nhand-written notes above the beliefs section.\n{}\nstale content\n{}\nfooter prose\n",
            BELIEFS_BEGIN_MARKER, BELIEFS_END_MARKER
        ),
    )
    .unwrap();

    let pool = Arc::new(DatabasePool::open_memory("belief_splice").await.unwrap());
    pool.interact(|conn| insert_belief_sync(conn, &demoted_belief()).map_err(anyhow::Error::from))
        .await
        .unwrap();

    let metrics = Arc::new(DaemonMetrics::default());
    let consolidator = Consolidator::new(pool, config.clone(), metrics, None);
    consolidator.run_cycle(1_700_000_100).await.unwrap();

    let contents = std::fs::read_to_string(config.global_memory_path()).unwrap();
    assert!(contents.contains("hand-written notes above the beliefs section."));
    assert!(contents.contains("footer prose"));
    assert!(!contents.contains("stale content"), "old section body must be replaced, not appended to");
    assert!(contents.contains("the project uses pnpm, not npm"));
    assert!(contents.contains("confidence: 0.80"));
}

#[tokio::test]
async fn a_belief_below_promotion_confidence_is_never_spliced_in() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        home: dir.path().to_path_buf(),
        project_roots: Vec::new(),
        api_keys: Default::default(),
        rss_budget_bytes: 1,
    });
    std::fs::write(config.global_memory_path(), "# Memory\n").unwrap();

    let mut unconvincing = demoted_belief();
    unconvincing.id = "b2".to_string();
    unconvincing.confidence_alpha = 3.0;
    unconvincing.confidence_beta = 2.0; // confidence 0.6, below the 0.7 promote bar

    let pool = Arc::new(DatabasePool::open_memory("belief_no_splice").await.unwrap());
    pool.interact(move |conn| insert_belief_sync(conn, &unconvincing).map_err(anyhow::Error::from))
        .await
        .unwrap();

    let metrics = Arc::new(DaemonMetrics::default());
    let consolidator = Consolidator::new(pool, config.clone(), metrics, None);
    consolidator.run_cycle(1_700_000_200).await.unwrap();

    let contents = std::fs::read_to_string(config.global_memory_path()).unwrap();
    assert_eq!(contents, "# Memory\n", "no status transition means no belief-section write at all");
}
