// Coverage for two invariants from spec.md §8: scope <=> project/project_path,
// and len(embedding) is either 0 or DIMS·4 bytes once packed for storage.
#![cfg(feature = "test-util")]

use engram::config::DIMS;
use engram::store::episode::{get_episode_sync, insert_episode_sync};
use engram::store::row::{blob_to_embedding, embedding_to_blob};
use engram::store::types::{Episode, Importance, Scope, SourceType};
use engram::store::DatabasePool;

fn episode(scope: Scope, project: Option<&str>, project_path: Option<&str>) -> Episode {
    Episode {
        id: "ep1".to_string(),
        session_id: "sess-1".to_string(),
        project: project.map(String::from),
        project_path: project_path.map(String::from),
        scope,
        summary: "something happened".to_string(),
        full_content: None,
        entities: vec![],
        importance: Importance::Normal,
        source_type: SourceType::Auto,
        embedding: Some(vec![0.1; DIMS]),
        created_at: 1,
        accessed_at: 1,
        access_count: 0,
        graduated_at: None,
    }
}

#[test]
fn project_scope_without_project_fields_violates_the_invariant() {
    assert!(episode(Scope::Project, Some("demo"), Some("/repo")).check_scope_invariant());
    assert!(!episode(Scope::Project, None, None).check_scope_invariant());
    assert!(!episode(Scope::Project, Some("demo"), None).check_scope_invariant());
}

#[test]
fn global_scope_with_project_fields_set_violates_the_invariant() {
    assert!(episode(Scope::Global, None, None).check_scope_invariant());
    assert!(!episode(Scope::Global, Some("demo"), Some("/repo")).check_scope_invariant());
}

#[test]
fn packed_embedding_round_trips_and_is_exactly_dims_times_four_bytes() {
    let original = vec![0.25f32; DIMS];
    let blob = embedding_to_blob(&original);
    assert_eq!(blob.len(), DIMS * 4);

    let restored = blob_to_embedding(&blob);
    assert_eq!(restored, original);
}

#[test]
fn an_episode_with_no_embedding_stores_and_reloads_as_none() {
    let blob = embedding_to_blob(&[]);
    assert_eq!(blob.len(), 0);
}

#[tokio::test]
async fn stored_and_reloaded_episode_embeddings_stay_dims_times_four_bytes() {
    let pool = DatabasePool::open_memory("episode_invariants").await.unwrap();
    let ep = episode(Scope::Global, None, None);
    pool.interact({
        let ep = ep.clone();
        move |conn| insert_episode_sync(conn, &ep).map_err(anyhow::Error::from)
    })
    .await
    .unwrap();

    let fetched = pool
        .interact(|conn| get_episode_sync(conn, "ep1").map_err(anyhow::Error::from))
        .await
        .unwrap()
        .unwrap();

    let embedding = fetched.embedding.expect("embedding round-trips through the blob column");
    assert_eq!(embedding.len(), DIMS);
    assert_eq!(embedding_to_blob(&embedding).len(), DIMS * 4);
}
