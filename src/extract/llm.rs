// src/extract/llm.rs
// Chat-completion client for the extractor. A small, cheap model is enough:
// the contract is strict JSON-only output, not open-ended conversation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4.1-nano";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 2000;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a memory extraction engine for a coding \
assistant. Given a rolling summary and a batch of new conversation turns, identify atomic, \
durable facts worth remembering: decisions, preferences, constraints, and non-obvious context. \
Respond with JSON only, no prose, of the exact shape \
{\"memories\": [{\"summary\": string, \"full_content\": string|null, \"entities\": [string], \
\"importance\": \"high\"|\"normal\", \"scope\": \"global\"|\"project\"}], \"updatedSummary\": \
string}. Return an empty memories array if nothing is worth remembering.";

pub const BELIEF_SYNTHESIS_SYSTEM_PROMPT: &str = "You are a belief synthesis engine for a coding \
assistant's memory store. Given a cluster of related episodes -- atomic facts observed from past \
conversations -- synthesize the single higher-order statement they jointly bear on. Respond with \
JSON only, no prose, of the exact shape {\"statement\": string, \"subject\": string|null, \
\"predicate\": string|null, \"context\": string|null, \"supporting\": [string], \"contradicting\": \
[string]}, where \"supporting\"/\"contradicting\" list the given episode ids that back or refute \
the statement. Every episode id provided must appear in exactly one of the two lists.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(api_key: String, base_url: Option<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Send a prompt under the given system prompt and return the raw completion
    /// text. Callers are responsible for JSON-parsing and handling malformed
    /// output.
    pub async fn complete(&self, system_prompt: &str, user_prompt: String) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system_prompt.to_string() },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&req)
            .send()
            .await
            .context("extraction chat request failed")?
            .error_for_status()
            .context("extraction provider returned an error")?
            .json()
            .await
            .context("failed to parse extraction chat response")?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("extraction response had no message content")
    }
}
