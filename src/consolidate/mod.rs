// src/consolidate/mod.rs
// Consolidator (spec.md §5): a timer-driven background pass that graduates
// high-value episodes into curated Markdown, compresses stale full_content,
// archives overflowing curated files, and evaluates belief transitions.
//
// Single-execution guard grounded on the `ConsolidationEngine::is_running`
// `AtomicBool` compare-exchange pattern (other_examples consolidation engine).

pub mod belief;
pub mod markdown;

use crate::config::{Config, MAX_GRADUATED_PER_CYCLE, MAX_MEMORY_LINES};
use crate::daemon::health::DaemonMetrics;
use crate::extract::llm::ChatClient;
use crate::store::belief::{active_beliefs_for_scope_sync, projects_with_active_beliefs_sync};
use crate::store::episode::{compress_stale_sync, graduation_candidates_sync, mark_graduated_sync};
use crate::store::types::{Belief, Episode};
use crate::store::DatabasePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

const COMPRESS_AFTER_SECS: i64 = 14 * 24 * 3600;
const GRADUATION_MIN_ACCESS_COUNT: i64 = 3;
const GRADUATION_ACCESS_LIMIT: usize = 2 * MAX_GRADUATED_PER_CYCLE;
const GRADUATION_COLD_START_AFTER_SECS: i64 = 14 * 24 * 3600;
const GRADUATION_COLD_START_LIMIT: usize = 10;
const CONSOLIDATION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

pub struct Consolidator {
    pool: Arc<DatabasePool>,
    config: Arc<Config>,
    metrics: Arc<DaemonMetrics>,
    /// Belief synthesis (spec.md §4.7 C7) only runs when a chat provider is
    /// configured; `None` means the step is a no-op this cycle.
    chat: Option<Arc<ChatClient>>,
    is_running: AtomicBool,
}

impl Consolidator {
    pub fn new(
        pool: Arc<DatabasePool>,
        config: Arc<Config>,
        metrics: Arc<DaemonMetrics>,
        chat: Option<Arc<ChatClient>>,
    ) -> Self {
        Self { pool, config, metrics, chat, is_running: AtomicBool::new(false) }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(CONSOLIDATION_INTERVAL);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    if let Err(e) = self.run_cycle(now).await {
                        warn!(error = %e, "consolidation cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn run_cycle(&self, now: i64) -> anyhow::Result<()> {
        if self.is_running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            info!("consolidation already in progress, skipping this tick");
            return Ok(());
        }
        let result = self.run_cycle_inner(now).await;
        self.is_running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle_inner(&self, now: i64) -> anyhow::Result<()> {
        let graduated = self.graduate(now).await?;
        let compressed = self
            .pool
            .interact(move |conn| {
                compress_stale_sync(conn, now - COMPRESS_AFTER_SECS).map_err(anyhow::Error::from)
            })
            .await?;

        let synthesized = match &self.chat {
            Some(chat) => belief::synthesize(&self.pool, chat, now).await?,
            None => Vec::new(),
        };

        let belief_changes = belief::evaluate_transitions(&self.pool, now).await?;
        if !synthesized.is_empty() || !belief_changes.is_empty() {
            self.write_belief_sections().await?;
        }

        DaemonMetrics::incr(&self.metrics.consolidation_cycles);
        self.metrics.episodes_graduated.fetch_add(graduated.len() as u64, Ordering::Relaxed);

        info!(
            graduated = graduated.len(),
            compressed,
            synthesized = synthesized.len(),
            belief_changes = belief_changes.len(),
            "consolidation cycle complete"
        );
        Ok(())
    }

    /// Re-render the sentinel-marked belief section of every curated Markdown
    /// file that currently has active beliefs: the global file, plus one pass
    /// per project that has an active project-scoped belief (spec.md §5).
    async fn write_belief_sections(&self) -> anyhow::Result<()> {
        let global_beliefs = self
            .pool
            .interact(|conn| active_beliefs_for_scope_sync(conn, "global", None).map_err(anyhow::Error::from))
            .await?;
        self.splice_belief_section(&self.config.global_memory_path(), &global_beliefs)?;

        let project_paths = self
            .pool
            .interact(|conn| projects_with_active_beliefs_sync(conn).map_err(anyhow::Error::from))
            .await?;
        for project_path in project_paths {
            let beliefs = self
                .pool
                .interact({
                    let project_path = project_path.clone();
                    move |conn| {
                        active_beliefs_for_scope_sync(conn, "project", Some(&project_path))
                            .map_err(anyhow::Error::from)
                    }
                })
                .await?;
            let path = Config::project_memory_path(std::path::Path::new(&project_path));
            self.splice_belief_section(&path, &beliefs)?;
        }
        Ok(())
    }

    fn splice_belief_section(&self, path: &std::path::Path, beliefs: &[Belief]) -> anyhow::Result<()> {
        let existing = std::fs::read_to_string(path).unwrap_or_default();
        let rendered = belief::render_beliefs_section(beliefs);
        let spliced = belief::splice_beliefs_section(&existing, &rendered);
        markdown::write_atomic(path, &spliced)?;
        Ok(())
    }

    async fn graduate(&self, now: i64) -> anyhow::Result<Vec<Episode>> {
        let candidates = self
            .pool
            .interact(move |conn| {
                graduation_candidates_sync(
                    conn,
                    now,
                    GRADUATION_MIN_ACCESS_COUNT,
                    GRADUATION_ACCESS_LIMIT,
                    GRADUATION_COLD_START_AFTER_SECS,
                    GRADUATION_COLD_START_LIMIT,
                    MAX_GRADUATED_PER_CYCLE,
                )
                .map_err(anyhow::Error::from)
            })
            .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Global episodes graduate into MEMORY.md; project-scoped episodes
        // graduate into that project's own curated file.
        let global_path = self.config.global_memory_path();
        let mut by_path: std::collections::HashMap<std::path::PathBuf, Vec<&Episode>> =
            std::collections::HashMap::new();
        for ep in &candidates {
            let path = match &ep.project_path {
                Some(p) => crate::config::Config::project_memory_path(std::path::Path::new(p)),
                None => global_path.clone(),
            };
            by_path.entry(path).or_default().push(ep);
        }

        for (path, episodes) in by_path {
            self.append_graduated(&path, &episodes)?;
        }

        for ep in &candidates {
            let id = ep.id.clone();
            self.pool
                .interact(move |conn| mark_graduated_sync(conn, &id, now).map_err(anyhow::Error::from))
                .await?;
        }

        Ok(candidates)
    }

    fn append_graduated(&self, path: &std::path::Path, episodes: &[&Episode]) -> anyhow::Result<()> {
        let existing = std::fs::read_to_string(path).unwrap_or_default();
        let mut lines: Vec<String> = existing.lines().map(String::from).collect();

        for ep in episodes {
            let marker = format!("<!-- {} -->", ep.id);
            if lines.iter().any(|l| l == &marker) {
                continue; // already present; still gets marked graduated by the caller
            }
            lines.push(format!("## {}", ep.summary));
            if let Some(content) = &ep.full_content {
                lines.push(content.clone());
            }
            lines.push(marker);
        }

        if lines.len() > MAX_MEMORY_LINES {
            self.archive_overflow(path, &mut lines)?;
        }

        markdown::write_atomic(path, &lines.join("\n"))?;
        Ok(())
    }

    /// Split off entries past the line budget into an archive file, keyed by
    /// the current year-month, splitting on `## ` section boundaries so an
    /// entry is never cut in half.
    fn archive_overflow(&self, _path: &std::path::Path, lines: &mut Vec<String>) -> anyhow::Result<()> {
        let overflow_start = MAX_MEMORY_LINES;
        if lines.len() <= overflow_start {
            return Ok(());
        }

        // Find the nearest preceding section boundary so we don't split a "## "
        // entry's body away from its header.
        let mut split_at = overflow_start;
        while split_at > 0 && !lines[split_at].starts_with("## ") {
            split_at -= 1;
        }
        if split_at == 0 {
            return Ok(()); // no clean boundary found; leave the file oversized this cycle
        }

        let overflow: Vec<String> = lines.split_off(split_at);
        let year_month = chrono::Utc::now().format("%Y-%m").to_string();
        let archive_path = self.config.archive_path(&year_month);
        let existing_archive = std::fs::read_to_string(&archive_path).unwrap_or_default();
        let combined = if existing_archive.is_empty() {
            overflow.join("\n")
        } else {
            format!("{existing_archive}\n{}", overflow.join("\n"))
        };
        markdown::write_atomic(&archive_path, &combined)?;
        Ok(())
    }
}
