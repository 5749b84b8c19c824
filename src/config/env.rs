// src/config/env.rs
// Environment-derived configuration, read once at startup.

use std::path::{Path, PathBuf};

/// API keys / endpoints for the embedding and chat-completion providers.
/// Both are external black boxes (spec.md §1) — this struct only carries the
/// credentials needed to call them.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_base_url: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            embedding_api_key: std::env::var("ENGRAM_EMBEDDING_API_KEY").ok(),
            embedding_base_url: std::env::var("ENGRAM_EMBEDDING_BASE_URL").ok(),
            chat_api_key: std::env::var("ENGRAM_CHAT_API_KEY").ok(),
            chat_base_url: std::env::var("ENGRAM_CHAT_BASE_URL").ok(),
        }
    }
}

/// Top-level configuration injected at daemon construction. Forbids hidden env
/// reads at call sites (spec.md §9 design note).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding memory.db, MEMORY.md, sockets, pid files, etc.
    pub home: PathBuf,
    /// Colon-separated list of directories that, when matched as a session's cwd,
    /// trigger path-based project inference (`CLAUDE_MEMORY_PROJECT_ROOTS`).
    pub project_roots: Vec<PathBuf>,
    pub api_keys: ApiKeys,
    /// RSS guidance; used only for the `status` health report (§7).
    pub rss_budget_bytes: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let home = std::env::var_os("ENGRAM_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".claude-mem")))
            .unwrap_or_else(|| PathBuf::from(".claude-mem"));

        let project_roots = std::env::var("CLAUDE_MEMORY_PROJECT_ROOTS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();

        Self {
            home,
            project_roots,
            api_keys: ApiKeys::from_env(),
            rss_budget_bytes: 500 * 1024 * 1024,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.home.join("memory.db")
    }

    pub fn global_memory_path(&self) -> PathBuf {
        self.home.join("MEMORY.md")
    }

    pub fn daily_log_path(&self, date: chrono::NaiveDate) -> PathBuf {
        self.home.join("memory").join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    pub fn archive_path(&self, year_month: &str) -> PathBuf {
        self.home.join("archive").join(format!("{year_month}.md"))
    }

    pub fn models_dir(&self) -> PathBuf {
        self.home.join("models")
    }

    pub fn recollection_path(&self, session_id: &str) -> Option<PathBuf> {
        if !is_valid_session_id(session_id) {
            return None;
        }
        Some(self.home.join("recollections").join(format!("{session_id}.json")))
    }

    pub fn pid_path(&self) -> PathBuf {
        self.home.join("engram.pid")
    }

    pub fn state_path(&self) -> PathBuf {
        self.home.join("engram-state.json")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.home.join("engram.sock")
    }

    pub fn stderr_log_path(&self) -> PathBuf {
        self.home.join("engram.stderr.log")
    }

    /// Per-project curated files live under `<project>/.claude/memory/`.
    pub fn project_memory_path(project_path: &Path) -> PathBuf {
        project_path.join(".claude").join("memory").join("MEMORY.md")
    }

    pub fn project_daily_log_path(project_path: &Path, date: chrono::NaiveDate) -> PathBuf {
        project_path
            .join(".claude")
            .join("memory")
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    /// Whether `cwd` matches one of the configured project roots (spec.md §4.4/§6).
    pub fn is_project_root(&self, cwd: &Path) -> bool {
        self.project_roots.iter().any(|r| r == cwd)
    }
}

/// Session ids are embedded in filesystem paths (`recollections/<id>.json`); reject
/// anything that isn't `^[A-Za-z0-9_-]+$` (spec.md §6).
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_traversal_session_ids() {
        assert!(!is_valid_session_id("../../etc/passwd"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id(""));
    }

    #[test]
    fn accepts_normal_session_ids() {
        assert!(is_valid_session_id("abc123_-XYZ"));
    }
}
