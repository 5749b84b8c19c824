// src/main.rs
// Grounded on `mira-server/src/main.rs`'s logging-setup-per-subcommand shape and
// its hook dispatch, which must never propagate a non-zero exit code.

mod cli;

use anyhow::Result;
use cli::{Cli, Commands, HookAction};
use clap::Parser;
use engram::config::Config;
use engram::daemon::Daemon;
use engram::ipc::HookClient;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".claude-mem/.env"));
    }

    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Hook { .. }) => init_hook_logging(),
        other => init_logging(other),
    }

    match cli.command {
        None | Some(Commands::Serve) => {
            let config = Config::from_env();
            let daemon = Daemon::start(config).await?;
            daemon.run().await?;
        }
        Some(Commands::Recall { prompt, session_id }) => {
            let config = Config::from_env();
            let client = HookClient::new(config);
            let bites = client.recollect(&prompt, &session_id).await;
            println!("{}", serde_json::to_string_pretty(&bites)?);
        }
        Some(Commands::Status) => {
            run_status().await?;
        }
        Some(Commands::Hook { action }) => {
            // Hooks must never exit non-zero -- the host treats any non-zero
            // exit as a broken hook and drops the turn. Catch errors and
            // panics, log to stderr, and always print something parseable.
            use std::io::Write;
            let result = tokio::task::spawn(run_hook(action)).await;
            match result {
                Ok(Ok(output)) => println!("{output}"),
                Ok(Err(e)) => {
                    eprintln!("[engram] hook error (non-fatal): {e:#}");
                    let _ = writeln!(std::io::stdout(), "{{}}");
                }
                Err(join_err) => {
                    eprintln!("[engram] hook panic (non-fatal): {join_err}");
                    let _ = writeln!(std::io::stdout(), "{{}}");
                }
            }
        }
        Some(Commands::Migrate) => {
            let config = Config::from_env();
            engram::store::DatabasePool::open(&config.db_path()).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}

fn init_logging(command: &Option<Commands>) {
    let level = match command {
        Some(Commands::Recall { .. }) | Some(Commands::Status) => Level::WARN,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Hooks are short-lived and their stderr is typically swallowed by the host;
/// keep them quiet by default and skip timestamps/targets entirely.
fn init_hook_logging() {
    let hook_level = std::env::var("ENGRAM_HOOK_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let level = match hook_level.to_lowercase().as_str() {
        "off" => return,
        "error" => Level::ERROR,
        "info" => Level::INFO,
        "debug" | "trace" => Level::DEBUG,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(serde::Deserialize, Default)]
struct HookInput {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

/// Read a JSON payload from stdin (the host's hook protocol), run the
/// requested action, and return the text to print on stdout.
async fn run_hook(action: HookAction) -> Result<String> {
    let input: HookInput = {
        use std::io::Read;
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        if raw.trim().is_empty() { HookInput::default() } else { serde_json::from_str(&raw)? }
    };
    let session_id = input.session_id.unwrap_or_else(|| "unknown".to_string());

    let config = Config::from_env();
    let client = HookClient::new(config);

    match action {
        HookAction::SessionStart => {
            // Warm the snapshot for this session without injecting anything yet.
            let _ = client.recollect("", &session_id).await;
            Ok("{}".to_string())
        }
        HookAction::UserPromptSubmit => {
            let prompt = input.prompt.unwrap_or_default();
            let bites = client.recollect(&prompt, &session_id).await;
            if bites.is_empty() {
                Ok("{}".to_string())
            } else {
                let injection = engram::recollection::render_injection(&bites);
                Ok(serde_json::json!({ "additionalContext": injection }).to_string())
            }
        }
    }
}

async fn run_status() -> Result<()> {
    let config = Config::from_env();

    if engram::daemon::pid::daemon_is_running(&config.pid_path()).is_none() {
        println!("engram daemon not running");
        return Ok(());
    }

    match fetch_health_report(&config).await {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        Err(e) => {
            eprintln!("[engram] daemon pid file present but status request failed: {e:#}");
            println!("engram daemon not responding");
        }
    }
    Ok(())
}

async fn fetch_health_report(config: &Config) -> Result<serde_json::Value> {
    use engram::config::IPC_CONNECT_TIMEOUT;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    let stream =
        tokio::time::timeout(IPC_CONNECT_TIMEOUT, UnixStream::connect(config.socket_path())).await??;
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    write.write_all(b"{\"event\":\"status\"}\n").await?;
    write.flush().await?;

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(serde_json::from_str(line.trim())?)
}
