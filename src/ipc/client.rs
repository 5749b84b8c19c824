// src/ipc/client.rs
// Hook-side IPC client (spec.md §6): hooks are short-lived and must never
// block the user's CLI. Connecting to a live daemon is the happy path; if the
// socket is refused or missing, fall back to the last recollection snapshot
// written to disk for this session rather than failing the hook outright.
//
// Grounded on `mira-server/src/ipc/client.rs`'s connect-with-timeout-then-
// fallback shape, adapted from a direct-DB fallback to a cached-snapshot one
// (hooks here never touch the database directly).

use crate::config::{Config, IPC_CONNECT_TIMEOUT};
use crate::store::types::Bite;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

pub struct HookClient {
    config: Config,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct RecollectionSnapshot {
    pub bites: Vec<Bite>,
}

impl HookClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Request a recollection for `prompt`/`session_id`. On any IPC failure,
    /// falls back to the session's last persisted snapshot (or an empty
    /// result if none exists) -- the hook must still exit cleanly.
    pub async fn recollect(&self, prompt: &str, session_id: &str) -> Vec<Bite> {
        match self.recollect_via_socket(prompt, session_id).await {
            Ok(bites) => {
                self.persist_snapshot(session_id, &bites);
                bites
            }
            Err(e) => {
                debug!(error = %e, "IPC recollect failed, falling back to last snapshot");
                self.load_snapshot(session_id)
            }
        }
    }

    async fn recollect_via_socket(&self, prompt: &str, session_id: &str) -> anyhow::Result<Vec<Bite>> {
        let sock = self.config.socket_path();
        let stream =
            tokio::time::timeout(IPC_CONNECT_TIMEOUT, UnixStream::connect(&sock)).await??;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let req = json!({ "event": "recollect", "prompt": prompt, "sessionId": session_id });
        let mut line = serde_json::to_string(&req)?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;
        write.flush().await?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line).await?;

        let value: serde_json::Value = serde_json::from_str(response_line.trim())?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let msg = value.get("error").and_then(|v| v.as_str()).unwrap_or("unknown error");
            anyhow::bail!("daemon returned error: {msg}");
        }

        let bites: Vec<Bite> = serde_json::from_value(
            value.get("bites").cloned().unwrap_or(serde_json::Value::Array(vec![])),
        )?;
        Ok(bites)
    }

    fn persist_snapshot(&self, session_id: &str, bites: &[Bite]) {
        let Some(path) = self.config.recollection_path(session_id) else { return };
        let Some(parent) = path.parent() else { return };
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
        let snapshot = RecollectionSnapshot { bites: bites.to_vec() };
        if let Ok(json) = serde_json::to_vec(&snapshot) {
            let _ = std::fs::write(path, json);
        }
    }

    fn load_snapshot(&self, session_id: &str) -> Vec<Bite> {
        let Some(path) = self.config.recollection_path(session_id) else { return Vec::new() };
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<RecollectionSnapshot>(&s).ok())
            .map(|s| s.bites)
            .unwrap_or_default()
    }
}
