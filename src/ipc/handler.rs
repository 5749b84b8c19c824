// src/ipc/handler.rs
// Per-connection handler for IPC requests (spec.md §6, §8). Bounded-line reads
// guard against OOM from a misbehaving client; every event carries its own
// timeout. Grounded on `mira-server/src/ipc/handler.rs`'s fill_buf/consume
// bounded-read loop, adapted to the `{event, ...}` wire shape and this
// project's event set.

use super::protocol::{IpcRequest, IpcResponse, RecollectPayload};
use crate::config::{IPC_IDLE_TIMEOUT, IPC_MAX_LINE_BYTES};
use crate::daemon::Daemon;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

fn event_timeout(event: &str) -> std::time::Duration {
    match event {
        "recollect" => std::time::Duration::from_secs(5),
        "status" => std::time::Duration::from_secs(2),
        _ => std::time::Duration::from_secs(3),
    }
}

pub async fn handle_connection<S>(stream: S, daemon: Arc<Daemon>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let mut buf = String::new();
        let mut eof = false;
        let mut too_large = false;

        loop {
            let read = tokio::time::timeout(IPC_IDLE_TIMEOUT, reader.fill_buf()).await;
            let available = match read {
                Ok(Ok([])) => {
                    eof = true;
                    break;
                }
                Ok(Ok(b)) => b,
                Ok(Err(e)) => {
                    let _ = write_response(&mut writer, &IpcResponse::error(format!("read error: {e}"))).await;
                    return;
                }
                Err(_) => {
                    eof = true; // idle timeout: treat like a clean disconnect
                    break;
                }
            };

            let newline_pos = available.iter().position(|&b| b == b'\n');
            let end = newline_pos.map(|p| p + 1).unwrap_or(available.len());
            if buf.len() + end > IPC_MAX_LINE_BYTES {
                too_large = true;
                reader.consume(end);
                break;
            }
            buf.push_str(&String::from_utf8_lossy(&available[..end]));
            reader.consume(end);
            if newline_pos.is_some() {
                break;
            }
        }

        if eof {
            break;
        }
        if too_large {
            let _ = write_response(
                &mut writer,
                &IpcResponse::error(format!("request exceeds {IPC_MAX_LINE_BYTES} bytes")),
            )
            .await;
            break;
        }

        let trimmed = buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        let req: IpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                let _ = write_response(&mut writer, &IpcResponse::error(format!("parse error: {e}"))).await;
                continue;
            }
        };

        let resp = match tokio::time::timeout(event_timeout(&req.event), dispatch(&req, &daemon)).await {
            Ok(Ok(v)) => IpcResponse::success(v),
            Ok(Err(e)) => IpcResponse::error(e.to_string()),
            Err(_) => IpcResponse::error("timeout"),
        };

        if write_response(&mut writer, &resp).await.is_err() {
            break;
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &IpcResponse) -> std::io::Result<()> {
    let mut json = serde_json::to_string(resp)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"serialize error"}"#.to_string());
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await
}

async fn dispatch(req: &IpcRequest, daemon: &Arc<Daemon>) -> anyhow::Result<serde_json::Value> {
    match req.event.as_str() {
        "recollect" => {
            let payload: RecollectPayload = serde_json::from_value(req.payload.clone())?;
            let bites = daemon.recollect(&payload.prompt, &payload.session_id).await?;
            Ok(serde_json::json!({ "bites": bites }))
        }
        "status" => {
            let report = daemon.health_report().await;
            Ok(serde_json::to_value(report)?)
        }
        other => anyhow::bail!("unknown event: {other}"),
    }
}
