// src/cli.rs
// Command-line surface (spec.md §7). Grounded on `mira-server/src/cli/mod.rs`'s
// Cli/Commands shape, narrowed to the handful of subcommands this daemon needs:
// `serve`, `recall`, `status`, `hook <action>`, `migrate`.

use clap::{Parser, Subcommand};
use std::fmt;

#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "Local, always-on memory engine for an LLM coding assistant")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon in the foreground (default if no subcommand is given).
    Serve,

    /// Query recollection directly from the command line, bypassing the hook.
    Recall {
        /// The prompt text to search memory against.
        prompt: String,

        /// Session id to scope the recollection snapshot fallback to.
        #[arg(long, default_value = "cli")]
        session_id: String,
    },

    /// Print daemon health: pid, uptime, rss, and background-task counters.
    Status,

    /// Claude Code hook entry points. Hooks must never exit non-zero.
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },

    /// Run pending schema migrations against the database and exit.
    Migrate,
}

#[derive(Subcommand, Clone, Copy)]
pub enum HookAction {
    /// Fired on session start; seeds the recollection snapshot for this session.
    SessionStart,
    /// Fired before a user prompt is sent to the model; injects recollection.
    UserPromptSubmit,
}

impl fmt::Display for HookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookAction::SessionStart => "session-start",
            HookAction::UserPromptSubmit => "user-prompt-submit",
        };
        write!(f, "{s}")
    }
}
