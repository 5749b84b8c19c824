// src/embed/mod.rs
// Embedding provider fallback chain (spec.md §4.2): Local -> Hosted -> Null.
// Every call first checks the content-hash cache; a cache hit never touches a
// provider. Grounded on `mira-server/src/embeddings/mod.rs`'s provider-priority
// `EmbeddingClient` facade, adapted from a single-backend selection to an
// always-attempt-in-order fallback chain with a Null terminal (callers must cope
// with missing embeddings — lexical-only search is always available).

pub mod cache;
pub mod hosted;
pub mod local;
pub mod similarity;

pub use similarity::cosine;

use crate::config::{ApiKeys, Config};
use crate::daemon::health::DaemonMetrics;
use crate::store::DatabasePool;
use hosted::HostedEmbeddings;
use local::LocalEmbeddings;
use std::sync::Arc;
use tracing::{debug, warn};

enum Backend {
    Local(LocalEmbeddings),
    Hosted(HostedEmbeddings),
    Null,
}

/// Embeds text, falling back through providers and a persistent cache.
/// `embed_many` never fails outright: a text that every provider rejects comes
/// back as `None` so episodes/chunks can still be stored without a vector.
pub struct EmbeddingPipeline {
    primary: Backend,
    fallback: Backend,
    pool: Arc<DatabasePool>,
    metrics: Arc<DaemonMetrics>,
}

impl EmbeddingPipeline {
    pub fn from_config(
        config: &Config,
        pool: Arc<DatabasePool>,
        http_client: reqwest::Client,
        metrics: Arc<DaemonMetrics>,
    ) -> Self {
        let ApiKeys { embedding_api_key, embedding_base_url, .. } = config.api_keys.clone();

        let primary = Backend::Local(LocalEmbeddings::new(embedding_base_url.clone(), http_client.clone()));
        let fallback = match embedding_api_key {
            Some(key) => Backend::Hosted(HostedEmbeddings::new(key, embedding_base_url, http_client)),
            None => Backend::Null,
        };

        Self { primary, fallback, pool, metrics }
    }

    pub async fn embed_one(&self, text: &str, now: i64) -> Option<Vec<f32>> {
        self.embed_many(std::slice::from_ref(&text.to_string()), now).await.into_iter().next().flatten()
    }

    pub async fn embed_many(&self, texts: &[String], now: i64) -> Vec<Option<Vec<f32>>> {
        let mut hashes = Vec::with_capacity(texts.len());
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_idx = Vec::new();
        let mut uncached_text = Vec::new();

        for (i, t) in texts.iter().enumerate() {
            let hash = cache::content_hash(t);
            let cached = cache::lookup(&self.pool, &hash).await.unwrap_or(None);
            match cached {
                Some(v) => results.push(Some(v)),
                None => {
                    results.push(None);
                    uncached_idx.push(i);
                    uncached_text.push(t.clone());
                }
            }
            hashes.push(hash);
        }

        if uncached_text.is_empty() {
            return results;
        }

        let fresh = self.embed_uncached(&uncached_text).await;
        for (slot, embedding) in uncached_idx.into_iter().zip(fresh.into_iter()) {
            if let Some(ref v) = embedding {
                let _ = cache::store(&self.pool, &hashes[slot], v, now).await;
            }
            results[slot] = embedding;
        }

        results
    }

    async fn embed_uncached(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if let Some(v) = self.try_backend(&self.primary, texts).await {
            return v;
        }
        warn!("primary embedding provider failed, falling back");
        DaemonMetrics::incr(&self.metrics.embedding_fallbacks);
        if let Some(v) = self.try_backend(&self.fallback, texts).await {
            return v;
        }
        debug!("no embedding provider available; returning null embeddings");
        vec![None; texts.len()]
    }

    async fn try_backend(&self, backend: &Backend, texts: &[String]) -> Option<Vec<Option<Vec<f32>>>> {
        match backend {
            Backend::Local(c) => match c.embed_batch(texts).await {
                Ok(v) => Some(v.into_iter().map(Some).collect()),
                Err(e) => {
                    warn!(error = %e, "local embedding provider error");
                    None
                }
            },
            Backend::Hosted(c) => match c.embed_batch(texts).await {
                Ok(v) => Some(v.into_iter().map(Some).collect()),
                Err(e) => {
                    warn!(error = %e, "hosted embedding provider error");
                    None
                }
            },
            Backend::Null => None,
        }
    }
}
