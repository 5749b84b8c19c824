// src/daemon/health.rs
// Health/metrics surface for `engram status` (SPEC_FULL.md supplemented ambient
// feature). Grounded on `mira-server`'s server_state counter style, generalized
// from MCP-call counters to the daemon's own background-task counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DaemonMetrics {
    pub episodes_extracted: AtomicU64,
    pub episodes_graduated: AtomicU64,
    pub recollect_requests: AtomicU64,
    pub consolidation_cycles: AtomicU64,
    pub embedding_fallbacks: AtomicU64,
}

impl DaemonMetrics {
    pub fn snapshot(&self) -> DaemonMetricsSnapshot {
        DaemonMetricsSnapshot {
            episodes_extracted: self.episodes_extracted.load(Ordering::Relaxed),
            episodes_graduated: self.episodes_graduated.load(Ordering::Relaxed),
            recollect_requests: self.recollect_requests.load(Ordering::Relaxed),
            consolidation_cycles: self.consolidation_cycles.load(Ordering::Relaxed),
            embedding_fallbacks: self.embedding_fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Serialize)]
pub struct DaemonMetricsSnapshot {
    pub episodes_extracted: u64,
    pub episodes_graduated: u64,
    pub recollect_requests: u64,
    pub consolidation_cycles: u64,
    pub embedding_fallbacks: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub pid: i32,
    pub uptime_secs: u64,
    pub db_path: String,
    pub socket_path: String,
    pub rss_bytes: Option<u64>,
    pub rss_budget_bytes: u64,
    pub metrics: DaemonMetricsSnapshot,
}

/// Best-effort RSS read from `/proc/self/status`; `None` on non-Linux or
/// parse failure, never fatal.
#[cfg(target_os = "linux")]
pub fn current_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn current_rss_bytes() -> Option<u64> {
    None
}
