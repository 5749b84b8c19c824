// src/tailer/mod.rs
// Session tailer (spec.md §4.6): discovers Claude Code transcript files under
// `~/.claude/projects/*/*.jsonl`, tails each with a `notify` watch plus a
// periodic poll fallback, and hands batches of new messages to the extractor.
//
// Per-session state machine:
//   DISCOVERED -> TAILING <-> BATCHING -> TAILING -> CLOSED
//
// TAILING accumulates new messages; a BATCHING transition fires when either
// BATCH_MESSAGE_THRESHOLD messages have accumulated or IDLE_DEBOUNCE has
// elapsed since the last append. CLOSED is reached when the transcript file
// hasn't been touched for a long idle period and is dropped from the watch set.
//
// Grounded on `mira-server/src/jsonl/watcher.rs`'s notify+poll tailing loop,
// generalized from a single-session stats snapshot to a multi-session registry
// that drives extraction instead of a live-stats display.

pub mod state;
pub mod transcript;

use crate::config::{Config, BATCH_MESSAGE_THRESHOLD, IDLE_DEBOUNCE, STARTUP_SETTLE_MS};
use crate::embed::EmbeddingPipeline;
use crate::extract::{ExtractionInput, Extractor};
use crate::ipc::client::RecollectionSnapshot;
use crate::project::resolver;
use crate::recollection::format_bites;
use crate::search::{search_chunks, SearchOptions};
use crate::store::DatabasePool;
use state::{SessionPhase, SessionState, StateFile};
use std::collections::HashMap;
use std::io::{BufRead, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use transcript::parse_line;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);
const STALE_AFTER: Duration = Duration::from_secs(6 * 3600);

/// Debounce window after a notify event fires, batching rapid successive
/// writes before re-reading (spec.md §4.6 boundary behavior).
const NOTIFY_DEBOUNCE: Duration = Duration::from_millis(50);

/// Majority-vote share required for path-based project inference to commit to
/// a project rather than falling back to the configured root itself (spec.md §4.4).
const INFER_THRESHOLD: f64 = 0.6;

struct TrackedFile {
    session_id: String,
    path: PathBuf,
    state: SessionState,
    last_activity: Instant,
}

pub struct Tailer {
    config: Arc<Config>,
    extractor: Arc<Extractor>,
    pool: Arc<DatabasePool>,
    embeddings: Arc<EmbeddingPipeline>,
    files: Mutex<HashMap<String, TrackedFile>>,
    started_at: Instant,
}

impl Tailer {
    pub fn new(
        config: Arc<Config>,
        extractor: Arc<Extractor>,
        pool: Arc<DatabasePool>,
        embeddings: Arc<EmbeddingPipeline>,
    ) -> Self {
        let state_path = config.state_path();
        let persisted = state::load(&state_path);
        let mut files = HashMap::new();
        for (session_id, saved) in persisted.sessions {
            files.insert(
                session_id.clone(),
                TrackedFile {
                    session_id,
                    path: PathBuf::new(), // resolved on next discovery pass
                    state: saved,
                    last_activity: Instant::now(),
                },
            );
        }
        Self {
            config,
            extractor,
            pool,
            embeddings,
            files: Mutex::new(files),
            started_at: Instant::now(),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel::<()>(16);
        let _watcher = self.spawn_fs_watcher(notify_tx);

        let mut discovery_timer = tokio::time::interval(DISCOVERY_INTERVAL);
        loop {
            tokio::select! {
                _ = notify_rx.recv() => {
                    // Batch rapid writes before re-reading.
                    tokio::time::sleep(NOTIFY_DEBOUNCE).await;
                    while notify_rx.try_recv().is_ok() {}
                    self.poll_all().await;
                }
                _ = discovery_timer.tick() => {
                    self.discover().await;
                    self.poll_all().await;
                    self.persist_state().await;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    // Periodic poll fallback: notify can miss events under some
                    // filesystems/containers, so we never rely on it alone.
                    self.poll_all().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.persist_state().await;
                        debug!("tailer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Watch `~/.claude/projects` recursively so new session files and
    /// in-progress writes wake the tailer immediately instead of waiting for
    /// the next poll tick. Returns the watcher so the caller keeps it alive
    /// for the lifetime of the loop; dropping it stops the watch.
    fn spawn_fs_watcher(
        &self,
        tx: tokio::sync::mpsc::Sender<()>,
    ) -> Option<notify::RecommendedWatcher> {
        use notify::{Config, Event, EventKind, RecommendedWatcher, Watcher};

        let claude_dir = dirs::home_dir()?.join(".claude/projects");
        if !claude_dir.exists() {
            return None;
        }

        let mut watcher: RecommendedWatcher = Watcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.try_send(());
                    }
                }
            },
            Config::default(),
        )
        .ok()?;

        if let Err(e) = watcher.watch(&claude_dir, notify::RecursiveMode::Recursive) {
            warn!(error = %e, "failed to start filesystem watcher, falling back to polling only");
            return None;
        }
        Some(watcher)
    }

    async fn discover(&self) {
        let Some(claude_dir) = dirs::home_dir().map(|h| h.join(".claude/projects")) else {
            return;
        };
        let Ok(project_dirs) = std::fs::read_dir(&claude_dir) else { return };

        let mut files = self.files.lock().await;
        for entry in project_dirs.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Ok(session_files) = std::fs::read_dir(entry.path()) else { continue };
            for session_entry in session_files.flatten() {
                let path = session_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else { continue };

                files
                    .entry(session_id.to_string())
                    .and_modify(|f| {
                        if f.path.as_os_str().is_empty() {
                            f.path = path.clone();
                        }
                    })
                    .or_insert_with(|| TrackedFile {
                        session_id: session_id.to_string(),
                        path: path.clone(),
                        state: SessionState::default(),
                        last_activity: Instant::now(),
                    });
            }
        }
    }

    async fn poll_all(&self) {
        let session_ids: Vec<String> = {
            let files = self.files.lock().await;
            files.keys().cloned().collect()
        };

        for session_id in session_ids {
            if let Err(e) = self.poll_one(&session_id).await {
                warn!(session_id, error = %e, "failed polling session transcript");
            }
        }

        self.evict_stale().await;
    }

    async fn poll_one(&self, session_id: &str) -> std::io::Result<()> {
        let (path, offset) = {
            let files = self.files.lock().await;
            let Some(f) = files.get(session_id) else { return Ok(()) };
            if f.path.as_os_str().is_empty() {
                return Ok(());
            }
            (f.path.clone(), f.state.byte_offset)
        };

        let metadata = std::fs::metadata(&path)?;
        if metadata.len() <= offset {
            return Ok(());
        }

        let path_for_read = path.clone();
        let (lines, new_offset) = tokio::task::spawn_blocking(move || -> std::io::Result<(Vec<String>, u64)> {
            let mut file = std::fs::File::open(&path_for_read)?;
            file.seek(SeekFrom::Start(offset))?;
            let reader = std::io::BufReader::new(&file);
            let mut lines = Vec::new();
            let mut bytes_read = 0u64;
            for line in reader.lines() {
                let line = line?;
                bytes_read += line.len() as u64 + 1;
                if !line.trim().is_empty() {
                    lines.push(line);
                }
            }
            Ok((lines, offset + bytes_read))
        })
        .await??;

        if lines.is_empty() {
            return Ok(());
        }

        let mut new_messages = Vec::new();
        let mut touched_paths = Vec::new();
        let mut first_cwd = None;
        let mut last_user_message = None;

        for line in &lines {
            let Some(parsed) = parse_line(line) else { continue };
            if first_cwd.is_none() {
                first_cwd = parsed.cwd.clone();
            }
            touched_paths.extend(parsed.touched_paths);
            if parsed.is_message {
                if let Some(text) = parsed.text {
                    if parsed.role.as_deref() == Some("user") {
                        last_user_message = Some(text.clone());
                    }
                    new_messages.push(text);
                }
            }
        }

        let should_extract = {
            let mut files = self.files.lock().await;
            let Some(f) = files.get_mut(session_id) else { return Ok(()) };
            f.state.byte_offset = new_offset;
            f.state.messages_since_extraction += new_messages.len();
            f.state.pending_messages.extend(new_messages.iter().cloned());
            f.state
                .file_paths_since_last_extraction
                .extend(touched_paths.iter().cloned());
            if let Some(msg) = last_user_message {
                f.state.last_user_message = Some(msg);
            }
            f.last_activity = Instant::now();

            if f.state.project_path.is_none() {
                if let Some(cwd) = &first_cwd {
                    let touched = f.state.file_paths_since_last_extraction.clone();
                    self.resolve_project_into(&mut f.state, cwd, &touched);
                }
            }

            if f.state.phase == SessionPhase::Discovered {
                f.state.phase = SessionPhase::Tailing;
            }

            let settled = self.started_at.elapsed() > Duration::from_millis(STARTUP_SETTLE_MS);
            settled && f.state.messages_since_extraction >= BATCH_MESSAGE_THRESHOLD
        };

        if should_extract {
            self.flush_extraction(session_id).await;
        }

        Ok(())
    }

    /// Resolve `state`'s project from the session's first observed `cwd`, plus
    /// any file paths touched so far (spec.md §4.4 "From a transcript file").
    fn resolve_project_into(&self, state: &mut SessionState, cwd: &str, touched_paths: &[String]) {
        let resolved = resolve_project(&self.config, cwd, touched_paths);
        if let Some((project_path, project_name, is_root)) = resolved {
            state.project_path = Some(project_path);
            state.project_name = project_name;
            state.project_is_root = is_root;
        }
    }

    async fn flush_extraction(&self, session_id: &str) {
        let (input, last_user_message, project_path) = {
            let mut files = self.files.lock().await;
            let Some(f) = files.get_mut(session_id) else { return };
            f.state.phase = SessionPhase::Batching;

            f.state.file_paths_since_last_extraction.clear();
            let input = ExtractionInput {
                session_id: session_id.to_string(),
                project: f.state.project_name.clone(),
                project_path: f.state.project_path.clone(),
                rolling_summary: f.state.rolling_summary.clone(),
                new_messages: f.state.pending_messages.drain(..).collect(),
            };
            (input, f.state.last_user_message.clone(), f.state.project_path.clone())
        };

        let now = chrono::Utc::now().timestamp();
        let outcome = match self.extractor.extract_and_store(input, now).await {
            Ok(o) => {
                debug!(session_id, count = o.stored, "extraction batch stored");
                Some(o)
            }
            Err(e) => {
                warn!(session_id, error = %e, "extraction batch failed");
                None
            }
        };

        let mut files = self.files.lock().await;
        if let Some(f) = files.get_mut(session_id) {
            f.state.messages_since_extraction = 0;
            f.state.last_extracted_at = Some(now);
            f.state.phase = SessionPhase::Tailing;
            if let Some(summary) = outcome.and_then(|o| o.updated_summary) {
                f.state.rolling_summary = summary;
            }
        }
        drop(files);

        if let Some(prompt) = last_user_message {
            self.refresh_recollection_snapshot(session_id, &prompt, project_path, now).await;
        }
    }

    /// Re-run hybrid search over the session's last user prompt and persist
    /// the resulting bites to `recollections/<sessionId>.json` (spec.md §4.6
    /// step 5), so the next hook invocation sees memories informed by what
    /// was just extracted.
    async fn refresh_recollection_snapshot(
        &self,
        session_id: &str,
        prompt: &str,
        project_path: Option<String>,
        now: i64,
    ) {
        let Some(snapshot_path) = self.config.recollection_path(session_id) else { return };

        let query_embedding = self.embeddings.embed_one(prompt, now).await;
        let project_family = project_path.into_iter().collect();

        let results = match search_chunks(
            &self.pool,
            prompt,
            query_embedding,
            SearchOptions { limit: 8, project_family, now, diversify: false },
        )
        .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(session_id, error = %e, "recollection search failed");
                return;
            }
        };

        let snapshot = RecollectionSnapshot { bites: format_bites(&results) };
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!(session_id, error = %e, "failed to serialize recollection snapshot");
                return;
            }
        };
        if let Err(e) = crate::consolidate::markdown::write_atomic(&snapshot_path, &json) {
            warn!(session_id, error = %e, "failed to persist recollection snapshot");
        }
    }

    async fn evict_stale(&self) {
        let mut files = self.files.lock().await;
        let now = Instant::now();
        files.retain(|_, f| {
            let stale = now.duration_since(f.last_activity) > STALE_AFTER;
            if stale {
                debug!(session_id = %f.session_id, "evicting stale session from tailer");
            }
            !stale
        });
    }

    async fn persist_state(&self) {
        let files = self.files.lock().await;
        let mut out = StateFile::default();
        for (id, f) in files.iter() {
            out.sessions.insert(id.clone(), f.state.clone());
        }
        drop(files);
        if let Err(e) = state::save(&self.config.state_path(), &out) {
            warn!(error = %e, "failed to persist tailer state");
        }
    }

    /// Idle-debounce check: sessions with pending messages whose last activity
    /// exceeds IDLE_DEBOUNCE are flushed even below the message threshold.
    pub async fn flush_idle(&self) {
        let due: Vec<String> = {
            let files = self.files.lock().await;
            files
                .values()
                .filter(|f| {
                    f.state.messages_since_extraction > 0
                        && f.last_activity.elapsed() >= IDLE_DEBOUNCE
                })
                .map(|f| f.session_id.clone())
                .collect()
        };
        for session_id in due {
            self.flush_extraction(&session_id).await;
        }
    }
}

/// `(project_path, project_name, is_root)` for a session's first observed `cwd`,
/// given every file path touched so far. `None` means no project could be resolved.
///
/// When `cwd` matches a configured project root, attempts path-based inference over
/// the touched paths before falling back to the root itself; otherwise walks up from
/// `cwd` looking for a `.claude/` marker (spec.md §4.4).
fn resolve_project(
    config: &Config,
    cwd: &str,
    touched_paths: &[String],
) -> Option<(String, Option<String>, bool)> {
    let cwd_path = PathBuf::from(cwd);

    if config.is_project_root(&cwd_path) {
        let candidates: Vec<PathBuf> = touched_paths.iter().map(PathBuf::from).collect();
        return Some(match resolver::infer(&candidates, INFER_THRESHOLD) {
            Some(inferred) => {
                let name = inferred.file_name().map(|n| n.to_string_lossy().to_string());
                (inferred.to_string_lossy().to_string(), name, false)
            }
            None => {
                let name = cwd_path.file_name().map(|n| n.to_string_lossy().to_string());
                (cwd.to_string(), name, true)
            }
        });
    }

    resolver::project_root_from_cwd(&cwd_path).map(|root| {
        let name = root.file_name().map(|n| n.to_string_lossy().to_string());
        (root.to_string_lossy().to_string(), name, false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_start_inference_attributes_majority_subproject() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Projects");
        let project_a = root.join("A");
        std::fs::create_dir_all(project_a.join(".claude")).unwrap();
        std::fs::create_dir_all(root.join("B")).unwrap();

        let config = Config {
            home: dir.path().join("home"),
            project_roots: vec![root.clone()],
            api_keys: Default::default(),
            rss_budget_bytes: 1,
        };

        let touched = vec![
            project_a.join("main.ts").to_string_lossy().to_string(),
            project_a.join("lib.ts").to_string_lossy().to_string(),
            project_a.join("util.ts").to_string_lossy().to_string(),
            root.join("B").join("x.ts").to_string_lossy().to_string(),
        ];

        let (project_path, project_name, is_root) =
            resolve_project(&config, root.to_str().unwrap(), &touched).unwrap();

        assert_eq!(project_path, project_a.to_string_lossy());
        assert_eq!(project_name.as_deref(), Some("A"));
        assert!(!is_root);
    }

    #[test]
    fn falls_back_to_root_itself_when_no_inference_clears_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Projects");
        std::fs::create_dir_all(&root).unwrap();

        let config = Config {
            home: dir.path().join("home"),
            project_roots: vec![root.clone()],
            api_keys: Default::default(),
            rss_budget_bytes: 1,
        };

        let (project_path, _, is_root) =
            resolve_project(&config, root.to_str().unwrap(), &[]).unwrap();

        assert_eq!(project_path, root.to_string_lossy());
        assert!(is_root);
    }

    #[test]
    fn non_root_cwd_walks_up_for_claude_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        let nested = dir.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config {
            home: dir.path().join("home"),
            project_roots: vec![],
            api_keys: Default::default(),
            rss_budget_bytes: 1,
        };

        let (project_path, _, is_root) =
            resolve_project(&config, nested.to_str().unwrap(), &[]).unwrap();
        assert_eq!(project_path, dir.path().to_string_lossy());
        assert!(!is_root);
    }
}
