// src/tailer/state.rs
// Per-session tailer state, persisted to `engram-state.json` so a daemon
// restart resumes tailing without re-reading (and re-extracting) the whole
// transcript from byte zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionPhase {
    #[default]
    Discovered,
    Tailing,
    Batching,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub byte_offset: u64,
    pub messages_since_extraction: usize,
    pub last_extracted_at: Option<i64>,
    pub rolling_summary: String,
    pub file_paths_since_last_extraction: Vec<String>,
    pub pending_messages: Vec<String>,
    pub project_name: Option<String>,
    pub project_path: Option<String>,
    pub project_is_root: bool,
    /// The most recent user-authored message seen, used to re-run hybrid
    /// search for the per-batch recollection snapshot (spec.md §4.6 step 5).
    #[serde(default)]
    pub last_user_message: Option<String>,
    #[serde(skip)]
    pub phase: SessionPhase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            byte_offset: 0,
            messages_since_extraction: 0,
            last_extracted_at: None,
            rolling_summary: String::new(),
            file_paths_since_last_extraction: Vec::new(),
            pending_messages: Vec::new(),
            project_name: None,
            project_path: None,
            project_is_root: false,
            last_user_message: None,
            phase: SessionPhase::Discovered,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    pub sessions: HashMap<String, SessionState>,
}

pub fn load(path: &Path) -> StateFile {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Atomic write: write to a temp file in the same directory, then rename.
/// A crash mid-write leaves the previous `engram-state.json` intact.
pub fn save(path: &Path, state: &StateFile) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);
    let json = serde_json::to_vec_pretty(state)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let mut name = path.file_name().and_then(|n| n.to_str()).unwrap_or("state").to_string();
    name.push_str(&format!(".tmp.{pid}"));
    path.with_file_name(name)
}
