// src/daemon/mod.rs
// Daemon lifecycle (spec.md §7): startup sequence, shutdown sequence, and the
// shared `Daemon` handle every background task and IPC connection holds.

pub mod health;
pub mod pid;
pub mod reindex;

use crate::config::Config;
use crate::consolidate::Consolidator;
use crate::embed::EmbeddingPipeline;
use crate::extract::{llm::ChatClient, Extractor};
use crate::project::FamilyCache;
use crate::recollection::format_bites;
use crate::search::{search_chunks, SearchOptions};
use crate::store::types::Bite;
use crate::store::DatabasePool;
use crate::tailer::Tailer;
use health::{current_rss_bytes, DaemonMetrics, HealthReport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info};

pub struct Daemon {
    pub config: Arc<Config>,
    pub pool: Arc<DatabasePool>,
    pub embeddings: Arc<EmbeddingPipeline>,
    pub families: Arc<FamilyCache>,
    pub metrics: Arc<DaemonMetrics>,
    pub tailer: Arc<Tailer>,
    pub consolidator: Arc<Consolidator>,
    started_at: Instant,
}

impl Daemon {
    pub async fn start(config: Config) -> anyhow::Result<Arc<Self>> {
        let config = Arc::new(config);
        let now = chrono::Utc::now().timestamp();

        let metrics = Arc::new(DaemonMetrics::default());
        let pool = Arc::new(DatabasePool::open(&config.db_path()).await?);
        let http_client = reqwest::Client::new();
        let embeddings = Arc::new(EmbeddingPipeline::from_config(
            &config,
            pool.clone(),
            http_client.clone(),
            metrics.clone(),
        ));

        info!("re-indexing curated Markdown into the chunk table");
        reindex::reindex_all(&pool, &embeddings, &config, now).await?;

        let families = Arc::new(FamilyCache::new());
        families.rebuild(&pool).await?;

        let chat = Arc::new(ChatClient::new(
            config.api_keys.chat_api_key.clone().unwrap_or_default(),
            config.api_keys.chat_base_url.clone(),
            http_client,
        ));
        let extractor =
            Arc::new(Extractor::new(pool.clone(), embeddings.clone(), chat.clone(), metrics.clone()));
        let tailer = Arc::new(Tailer::new(
            config.clone(),
            extractor,
            pool.clone(),
            embeddings.clone(),
        ));
        // Belief synthesis (spec.md §4.7) needs the same chat client, but only
        // when a chat API key is actually configured.
        let synthesis_chat = config.api_keys.chat_api_key.is_some().then(|| chat.clone());
        let consolidator = Arc::new(Consolidator::new(
            pool.clone(),
            config.clone(),
            metrics.clone(),
            synthesis_chat,
        ));

        pid::write(&config.pid_path(), now)?;

        Ok(Arc::new(Self {
            config,
            pool,
            embeddings,
            families,
            metrics,
            tailer,
            consolidator,
            started_at: Instant::now(),
        }))
    }

    /// Spawn the background tasks (tailer, consolidator, IPC listener) and
    /// block until a shutdown signal arrives.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tailer_handle = tokio::spawn(self.tailer.clone().run(shutdown_rx.clone()));
        let consolidator_handle = tokio::spawn(self.consolidator.clone().run(shutdown_rx.clone()));
        let ipc_handle = tokio::spawn(crate::ipc::run_ipc_listener(self.clone()));

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, stopping background tasks");
        let _ = shutdown_tx.send(true);

        let _ = tailer_handle.await;
        let _ = consolidator_handle.await;
        ipc_handle.abort();

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        let _ = std::fs::remove_file(self.config.socket_path());
        pid::remove(&self.config.pid_path());
        info!("daemon shutdown complete");
    }

    pub async fn recollect(&self, prompt: &str, session_id: &str) -> anyhow::Result<Vec<Bite>> {
        health::DaemonMetrics::incr(&self.metrics.recollect_requests);

        let now = chrono::Utc::now().timestamp();
        let query_embedding = self.embeddings.embed_one(prompt, now).await;

        // Project scoping for this session, if the tailer has resolved one, is
        // looked up via the recollections snapshot path; recall defaults to
        // global-only when no project context is available yet.
        let project_family = Vec::new();

        let results = search_chunks(
            &self.pool,
            prompt,
            query_embedding,
            SearchOptions { limit: 8, project_family, now, diversify: false },
        )
        .await?;

        Ok(format_bites(&results))
    }

    pub async fn health_report(&self) -> HealthReport {
        HealthReport {
            pid: std::process::id() as i32,
            uptime_secs: self.started_at.elapsed().as_secs(),
            db_path: self.config.db_path().to_string_lossy().to_string(),
            socket_path: self.config.socket_path().to_string_lossy().to_string(),
            rss_bytes: current_rss_bytes(),
            rss_budget_bytes: self.config.rss_budget_bytes,
            metrics: self.metrics.snapshot(),
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
