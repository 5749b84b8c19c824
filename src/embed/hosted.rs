// src/embed/hosted.rs
// Hosted embedding provider: batched HTTP calls to an OpenAI-compatible endpoint.

use crate::config::DIMS;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Hosted providers cap batch size; stay well under typical provider limits.
const MAX_BATCH_SIZE: usize = 100;

pub struct HostedEmbeddings {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HostedEmbeddings {
    pub fn new(api_key: String, base_url: Option<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model: "text-embedding-3-small".to_string(),
        }
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            let resp: EmbeddingsResponse = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": self.model,
                    "input": chunk,
                    "dimensions": DIMS,
                }))
                .send()
                .await
                .context("hosted embedding request failed")?
                .error_for_status()
                .context("hosted embedding provider returned an error")?
                .json()
                .await
                .context("failed to parse hosted embedding response")?;

            for d in resp.data {
                if d.embedding.len() != DIMS {
                    anyhow::bail!(
                        "hosted embedding model returned {} dims, expected {DIMS}",
                        d.embedding.len()
                    );
                }
                out.push(d.embedding);
            }
        }
        Ok(out)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        v.pop().context("hosted provider returned no embeddings")
    }
}
