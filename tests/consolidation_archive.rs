// Cross-module scenario coverage for spec.md §8 scenario 4: archive overflow.
// A global curated file already past the line budget gets split on the next
// graduation cycle, with the overflow landing in the dated archive file.
#![cfg(feature = "test-util")]

use engram::config::{Config, MAX_MEMORY_LINES};
use engram::consolidate::Consolidator;
use engram::daemon::health::DaemonMetrics;
use engram::store::episode::insert_episode_sync;
use engram::store::types::{Episode, Importance, Scope, SourceType};
use engram::store::DatabasePool;
use std::sync::Arc;

fn high_value_episode(id: &str) -> Episode {
    Episode {
        id: id.to_string(),
        session_id: "sess-1".to_string(),
        project: None,
        project_path: None,
        scope: Scope::Global,
        summary: format!("graduated fact {id}"),
        full_content: Some("supporting detail".to_string()),
        entities: vec![],
        importance: Importance::High,
        source_type: SourceType::Auto,
        embedding: None,
        created_at: 1,
        accessed_at: 1,
        access_count: 0,
        graduated_at: None,
    }
}

#[tokio::test]
async fn overflowing_global_file_archives_the_oldest_sections() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        home: dir.path().to_path_buf(),
        project_roots: Vec::new(),
        api_keys: Default::default(),
        rss_budget_bytes: 1,
    });

    // Pre-seed MEMORY.md with 250 section entries, two lines each, well past
    // the 200-line budget.
    let mut lines = Vec::new();
    for i in 0..250 {
        lines.push(format!("## old entry {i}"));
        lines.push(format!("detail for entry {i}"));
    }
    std::fs::write(config.global_memory_path(), lines.join("\n")).unwrap();

    let pool = Arc::new(DatabasePool::open_memory("archive_overflow").await.unwrap());
    pool.interact(|conn| insert_episode_sync(conn, &high_value_episode("epA")).map_err(anyhow::Error::from))
        .await
        .unwrap();

    let metrics = Arc::new(DaemonMetrics::default());
    let consolidator = Consolidator::new(pool, config.clone(), metrics, None);
    consolidator.run_cycle(1_700_000_000).await.unwrap();

    let live_contents = std::fs::read_to_string(config.global_memory_path()).unwrap();
    let live_line_count = live_contents.lines().count();
    assert!(
        live_line_count <= MAX_MEMORY_LINES,
        "live file should be trimmed to the budget, got {live_line_count}"
    );
    // Sections are appended to the tail of the file, so the split point (at the
    // line budget) keeps the lowest-numbered sections live and archives the rest,
    // including whatever was just appended by this cycle's graduation.
    assert!(live_contents.contains("old entry 0"), "earliest sections should remain live");

    let year_month = chrono::Utc::now().format("%Y-%m").to_string();
    let archive_contents = std::fs::read_to_string(config.archive_path(&year_month)).unwrap();
    assert!(archive_contents.contains("graduated fact epA"), "overflowing sections, including this cycle's graduation, land in the archive");
}

#[tokio::test]
async fn re_running_graduation_with_no_candidates_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        home: dir.path().to_path_buf(),
        project_roots: Vec::new(),
        api_keys: Default::default(),
        rss_budget_bytes: 1,
    });
    std::fs::write(config.global_memory_path(), "# Memory\n").unwrap();

    let pool = Arc::new(DatabasePool::open_memory("no_candidates").await.unwrap());
    let metrics = Arc::new(DaemonMetrics::default());
    let consolidator = Consolidator::new(pool, config.clone(), metrics, None);

    consolidator.run_cycle(1).await.unwrap();
    let before = std::fs::read_to_string(config.global_memory_path()).unwrap();
    consolidator.run_cycle(2).await.unwrap();
    let after = std::fs::read_to_string(config.global_memory_path()).unwrap();

    assert_eq!(before, after);
}
