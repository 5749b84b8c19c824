// src/ipc/mod.rs
// Local Unix-socket IPC (spec.md §6): hooks are short-lived processes that
// connect, send one or more `{event, ...}` requests, and disconnect. Grounded
// on `mira-server/src/ipc/mod.rs`'s umask-before-bind + semaphore-bounded
// accept loop, narrowed to the single `engram.sock` artifact this spec names.

pub mod client;
pub mod handler;
pub mod protocol;

pub use client::HookClient;

use crate::daemon::Daemon;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const MAX_CONCURRENT_CONNECTIONS: usize = 16;
const ACCEPT_BACKPRESSURE_WAIT: std::time::Duration = std::time::Duration::from_secs(2);

pub async fn run_ipc_listener(daemon: Arc<Daemon>) -> anyhow::Result<()> {
    let path = daemon.config.socket_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(&path)?;
    }

    // Restrictive umask before bind closes the TOCTOU window between bind and
    // chmod: the socket never exists world-readable, even momentarily.
    let old_umask = unsafe { libc::umask(0o177) };
    let bind_result = tokio::net::UnixListener::bind(&path);
    unsafe { libc::umask(old_umask) };
    let listener = bind_result?;

    info!(path = %path.display(), "IPC listener started");

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTIONS));

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let permit = match tokio::time::timeout(
                    ACCEPT_BACKPRESSURE_WAIT,
                    semaphore.clone().acquire_owned(),
                )
                .await
                {
                    Ok(Ok(p)) => p,
                    Ok(Err(_)) => unreachable!("semaphore closed"),
                    Err(_) => {
                        warn!("IPC connection limit reached, rejecting");
                        let _ = stream.try_write(b"{\"ok\":false,\"error\":\"server overloaded\"}\n");
                        continue;
                    }
                };

                let daemon = daemon.clone();
                tokio::spawn(async move {
                    handler::handle_connection(stream, daemon).await;
                    drop(permit);
                });
            }
            Err(e) => warn!(error = %e, "IPC accept error"),
        }
    }
}
