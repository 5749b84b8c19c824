// src/embed/local.rs
// On-device embedding provider: a local HTTP model server (Ollama-compatible),
// queried one request at a time. A single-slot queue (tokio::sync::Mutex) keeps
// concurrent extraction/search calls from oversubscribing the local model, which
// usually runs on CPU and degrades badly under concurrent requests.

use crate::config::DIMS;
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";

pub struct LocalEmbeddings {
    client: reqwest::Client,
    base_url: String,
    model: String,
    slot: Mutex<()>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl LocalEmbeddings {
    pub fn new(base_url: Option<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: DEFAULT_MODEL.to_string(),
            slot: Mutex::new(()),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self.slot.lock().await;
        let resp: EmbedResponse = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&serde_json::json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .context("local embedding request failed")?
            .error_for_status()
            .context("local embedding server returned an error")?
            .json()
            .await
            .context("failed to parse local embedding response")?;

        if resp.embedding.len() != DIMS {
            anyhow::bail!(
                "local embedding model returned {} dims, expected {DIMS}",
                resp.embedding.len()
            );
        }
        Ok(resp.embedding)
    }

    /// The local provider has no native batch endpoint; the single-slot mutex
    /// already serializes these, so batching is just a sequential loop.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}
