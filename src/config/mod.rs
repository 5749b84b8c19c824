// src/config/mod.rs
// Configuration and shared constants. Built once in main() and threaded down by
// reference/Arc; nothing below this module reads an env var directly.

pub mod env;

pub use env::{ApiKeys, Config};

/// Embedding vector dimensionality. Fixed per spec: every stored embedding has
/// exactly this many float32 components.
pub const DIMS: usize = 768;

/// Cosine similarity above which a candidate episode is merged into an existing one
/// instead of creating a new row (§4.5).
pub const DEDUP_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Batch trigger: number of accumulated user/assistant messages that forces an
/// extraction batch regardless of idle time. Open Question in spec.md §9, decided here.
pub const BATCH_MESSAGE_THRESHOLD: usize = 8;

/// Batch trigger: idle time since the last transcript append that forces a flush.
pub const IDLE_DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(90_000);

/// Suppress recollection snapshot writes for this long after daemon start, so a
/// restart doesn't spam stale recollections while sessions replay their backlog.
pub const STARTUP_SETTLE_MS: u64 = 60_000;

/// Graduation candidates per cycle (access-based cap is 2x this, emitted cap is this).
pub const MAX_GRADUATED_PER_CYCLE: usize = 10;

/// Curated file line budget before archival kicks in.
pub const MAX_MEMORY_LINES: usize = 200;

/// Belief promotion / demotion confidence thresholds (point estimate alpha/(alpha+beta)).
pub const BELIEF_PROMOTE_CONFIDENCE: f64 = 0.7;
pub const BELIEF_DEMOTE_CONFIDENCE: f64 = 0.4;
pub const BELIEF_MIN_EVIDENCE: u32 = 3;

/// Belief synthesis (§5): episodes within this cosine similarity of a cluster's
/// seed are grouped together for a single LLM synthesis call. Looser than
/// `DEDUP_SIMILARITY_THRESHOLD` since belief-worthy episodes are related, not
/// literal duplicates.
pub const BELIEF_CLUSTER_SIMILARITY: f32 = 0.75;
/// Minimum episodes in a cluster before it's worth a synthesis call.
pub const BELIEF_MIN_CLUSTER_SIZE: usize = 2;
/// Episodes considered per synthesis cycle, oldest unprocessed first.
pub const BELIEF_SYNTHESIS_BATCH_LIMIT: usize = 200;

/// IPC connection budget.
pub const IPC_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const IPC_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
pub const IPC_MAX_LINE_BYTES: usize = 64 * 1024;
pub const HOOK_REQUEST_BUDGET: std::time::Duration = std::time::Duration::from_millis(240);

/// DB busy timeout (§4.1).
pub const DB_BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
