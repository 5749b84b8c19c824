// src/embed/cache.rs
// Content-hash embedding cache: avoids re-embedding identical text across episodes,
// chunks, and sessions (spec.md §4.2).

use crate::store::DatabasePool;
use sha2::{Digest, Sha256};

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn lookup(pool: &DatabasePool, hash: &str) -> anyhow::Result<Option<Vec<f32>>> {
    let hash = hash.to_string();
    pool.interact(move |conn| {
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM embedding_cache WHERE hash = ?1",
                [&hash],
                |r| r.get(0),
            )
            .ok();
        Ok(blob.map(|b| crate::store::row::blob_to_embedding(&b)))
    })
    .await
}

pub async fn store(pool: &DatabasePool, hash: &str, embedding: &[f32], now: i64) -> anyhow::Result<()> {
    let hash = hash.to_string();
    let blob = crate::store::row::embedding_to_blob(embedding);
    let dims = embedding.len() as i64;
    pool.interact(move |conn| {
        conn.execute(
            "INSERT INTO embedding_cache (hash, embedding, dims, updated_at) VALUES (?1,?2,?3,?4)
             ON CONFLICT(hash) DO UPDATE SET embedding = excluded.embedding, updated_at = excluded.updated_at",
            rusqlite::params![hash, blob, dims, now],
        )?;
        Ok(())
    })
    .await
}
