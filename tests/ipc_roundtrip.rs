// Cross-module IPC wire-format round trip: a real `Daemon` wired to a temp
// `ENGRAM_HOME`, exercised over an in-process duplex stream instead of a real
// Unix socket (spec.md §6, §8).

use engram::config::{ApiKeys, Config};
use engram::daemon::Daemon;
use engram::ipc::handler::handle_connection;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn temp_config(home: &std::path::Path) -> Config {
    Config {
        home: home.to_path_buf(),
        project_roots: Vec::new(),
        api_keys: ApiKeys::default(),
        rss_budget_bytes: 500 * 1024 * 1024,
    }
}

#[tokio::test]
async fn status_and_recollect_round_trip_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(dir.path());
    let daemon = Daemon::start(config).await.expect("daemon starts against a fresh temp home");

    assert!(dir.path().join("engram.pid").exists(), "startup must write the pid file");

    let (client, server) = tokio::io::duplex(8192);
    let server_daemon = daemon.clone();
    let server_task = tokio::spawn(async move {
        handle_connection(server, server_daemon).await;
    });

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"{\"event\":\"status\"}\n").await.unwrap();
    write_half.flush().await.unwrap();
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let status: serde_json::Value = serde_json::from_str(status_line.trim()).unwrap();
    assert_eq!(status["ok"], true);
    assert!(status["pid"].is_number());
    assert_eq!(status["metrics"]["recollect_requests"], 0);

    write_half
        .write_all(b"{\"event\":\"recollect\",\"prompt\":\"how do we store embeddings\",\"sessionId\":\"sess-1\"}\n")
        .await
        .unwrap();
    write_half.flush().await.unwrap();
    let mut recollect_line = String::new();
    reader.read_line(&mut recollect_line).await.unwrap();
    let recollect: serde_json::Value = serde_json::from_str(recollect_line.trim()).unwrap();
    assert_eq!(recollect["ok"], true);
    assert!(recollect["bites"].is_array());

    // A follow-up status call observes the recollect request counted.
    write_half.write_all(b"{\"event\":\"status\"}\n").await.unwrap();
    write_half.flush().await.unwrap();
    let mut status_line2 = String::new();
    reader.read_line(&mut status_line2).await.unwrap();
    let status2: serde_json::Value = serde_json::from_str(status_line2.trim()).unwrap();
    assert_eq!(status2["metrics"]["recollect_requests"], 1);

    drop(write_half);
    let _ = server_task.await;
}

#[tokio::test]
async fn unknown_event_returns_an_error_response_not_a_dropped_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(dir.path());
    let daemon = Daemon::start(config).await.unwrap();

    let (client, server) = tokio::io::duplex(8192);
    let server_task = tokio::spawn(async move {
        handle_connection(server, daemon).await;
    });

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"{\"event\":\"not-a-real-event\"}\n").await.unwrap();
    write_half.flush().await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let resp: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(resp["ok"], false);
    assert!(resp["error"].as_str().unwrap().contains("unknown event"));

    drop(write_half);
    let _ = server_task.await;
}
