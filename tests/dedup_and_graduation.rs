// Cross-module scenario coverage for spec.md §8 scenarios 2 and 3: dedup
// upsert against an existing episode, and idempotent re-run of graduation.
// Needs `--features test-util` for `DatabasePool::open_memory`.
#![cfg(feature = "test-util")]

use engram::store::episode::{
    dedup_candidates_sync, get_episode_sync, graduation_candidates_sync, insert_episode_sync,
    mark_graduated_sync, merge_into_episode_sync,
};
use engram::store::types::{Episode, Importance, Scope, SourceType};
use engram::store::DatabasePool;

fn sample_episode(id: &str, summary: &str, embedding: Vec<f32>) -> Episode {
    Episode {
        id: id.to_string(),
        session_id: "sess-1".to_string(),
        project: None,
        project_path: None,
        scope: Scope::Global,
        summary: summary.to_string(),
        full_content: None,
        entities: vec![],
        importance: Importance::Normal,
        source_type: SourceType::Auto,
        embedding: Some(embedding),
        created_at: 1,
        accessed_at: 1,
        access_count: 0,
        graduated_at: None,
    }
}

#[tokio::test]
async fn dedup_upsert_merges_instead_of_inserting_a_new_row() {
    let pool = DatabasePool::open_memory("dedup_upsert").await.unwrap();

    let existing = sample_episode("ep_abc123", "Use atomic rename for MEMORY.md writes", vec![1.0, 0.0, 0.0]);
    pool.interact({
        let existing = existing.clone();
        move |conn| insert_episode_sync(conn, &existing).map_err(anyhow::Error::from)
    })
    .await
    .unwrap();

    // A near-duplicate candidate at cosine similarity ~0.90 to the existing row.
    let candidate_embedding = vec![0.9f32, 0.4358899, 0.0];

    let snapshot = pool
        .interact(|conn| dedup_candidates_sync(conn, "global", None).map_err(anyhow::Error::from))
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);

    let cosine = engram::embed::cosine(&snapshot[0].embedding.clone().unwrap(), &candidate_embedding);
    assert!(cosine > 0.85, "candidate should clear the dedup threshold, got {cosine}");

    pool.interact({
        let id = existing.id.clone();
        move |conn| {
            merge_into_episode_sync(conn, &id, "Use atomic rename for memory file writes", &["rename".to_string()], 5)
                .map_err(anyhow::Error::from)
        }
    })
    .await
    .unwrap();

    let merged = pool
        .interact({
            let id = existing.id.clone();
            move |conn| get_episode_sync(conn, &id).map_err(anyhow::Error::from)
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(merged.access_count, 1);
    assert!(merged.entities.contains(&"rename".to_string()));

    let all_global = pool
        .interact(|conn| dedup_candidates_sync(conn, "global", None).map_err(anyhow::Error::from))
        .await
        .unwrap();
    assert_eq!(all_global.len(), 1, "merge must not create a second row");
}

#[tokio::test]
async fn graduation_is_idempotent_on_a_second_run() {
    let pool = DatabasePool::open_memory("graduation_idempotent").await.unwrap();

    for i in 0..3 {
        let mut ep = sample_episode(&format!("ep{i}"), "high value fact", vec![0.1, 0.2, 0.3]);
        ep.importance = Importance::High;
        ep.access_count = 5;
        pool.interact(move |conn| insert_episode_sync(conn, &ep).map_err(anyhow::Error::from))
            .await
            .unwrap();
    }

    let first_pass = pool
        .interact(|conn| {
            graduation_candidates_sync(conn, 100, 3, 20, 14 * 24 * 3600, 10, 10)
                .map_err(anyhow::Error::from)
        })
        .await
        .unwrap();
    assert_eq!(first_pass.len(), 3);

    for ep in &first_pass {
        let id = ep.id.clone();
        pool.interact(move |conn| mark_graduated_sync(conn, &id, 100).map_err(anyhow::Error::from))
            .await
            .unwrap();
    }

    // Re-running the candidate query must find nothing left to graduate: every
    // row now has `graduated_at` set (spec.md §8 scenario 3).
    let second_pass = pool
        .interact(|conn| {
            graduation_candidates_sync(conn, 100, 3, 20, 14 * 24 * 3600, 10, 10)
                .map_err(anyhow::Error::from)
        })
        .await
        .unwrap();
    assert!(second_pass.is_empty());
}

#[tokio::test]
async fn normal_importance_episodes_never_graduate_regardless_of_access_count() {
    let pool = DatabasePool::open_memory("graduation_importance_gate").await.unwrap();

    let mut ep = sample_episode("ep_normal", "frequently touched but unimportant", vec![0.1, 0.2, 0.3]);
    ep.access_count = 50;
    pool.interact(move |conn| insert_episode_sync(conn, &ep).map_err(anyhow::Error::from))
        .await
        .unwrap();

    let candidates = pool
        .interact(|conn| {
            graduation_candidates_sync(conn, 100, 3, 20, 14 * 24 * 3600, 10, 10)
                .map_err(anyhow::Error::from)
        })
        .await
        .unwrap();
    assert!(candidates.is_empty(), "only importance='high' episodes may graduate");
}
