//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::errors::{BrokerError, Result};

/// 2kc CLI: local secret broker for agent credential access.
#[derive(Parser)]
#[command(
    name = "2kc",
    about = "Local secret broker: justified, approved, single-use secret injection",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (default: ~/.2kc/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Manage secrets in the store
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },

    /// Request access to secrets and run a command with them injected
    Request(RequestArgs),

    /// Manage the 2kc configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Control the broker server
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// View the local audit trail
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },
}

/// Secrets subcommands.
#[derive(clap::Subcommand)]
pub enum SecretsAction {
    /// List all secrets (refs, uuids, and tags — never values)
    List,

    /// Add a secret
    Add {
        /// Human slug for the secret (e.g. deploy-key)
        reference: String,
        /// Secret value (omit for interactive prompt)
        value: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Remove a secret by uuid
    Remove {
        /// UUID of the secret to remove
        uuid: String,
    },
}

/// One end-to-end access attempt.
#[derive(clap::Args)]
pub struct RequestArgs {
    /// Secrets to request, by uuid or ref
    #[arg(required = true)]
    pub secrets: Vec<String>,

    /// Why access is needed
    #[arg(long)]
    pub reason: String,

    /// Task reference (ticket, issue, ...)
    #[arg(long)]
    pub task: String,

    /// Env var to receive the first secret's value
    #[arg(long)]
    pub env: Option<String>,

    /// Command to run with the secrets injected
    #[arg(long, num_args = 1.., allow_hyphen_values = true, required = true)]
    pub cmd: Vec<String>,

    /// Grant duration in seconds (default: 300)
    #[arg(long)]
    pub duration: Option<u64>,
}

/// Config subcommands.
#[derive(clap::Subcommand)]
pub enum ConfigAction {
    /// Write a default config file
    Init,
    /// Print the config with sensitive fields redacted
    Show,
}

/// Server subcommands.
#[derive(clap::Subcommand)]
pub enum ServerAction {
    /// Start the broker server (detached unless --foreground)
    Start {
        /// Run in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },
    /// Stop a running server
    Stop,
    /// Report whether the server is running
    Status,
    /// Auth token management
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(clap::Subcommand)]
pub enum TokenAction {
    /// Generate a fresh token and store it in the config
    Generate,
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Parse a human duration like `7d`, `24h`, or `30m`.
pub fn parse_since(input: &str) -> Result<chrono::Duration> {
    let input = input.trim();
    let (number, unit) = input.split_at(input.len().saturating_sub(1));
    let amount: i64 = number.parse().map_err(|_| BrokerError::InvalidInput {
        field: "since",
        message: format!("'{input}' — expected a number followed by d, h, or m"),
    })?;
    if amount <= 0 {
        return Err(BrokerError::InvalidInput {
            field: "since",
            message: format!("'{input}' — duration must be positive"),
        });
    }
    match unit {
        "d" => Ok(chrono::Duration::days(amount)),
        "h" => Ok(chrono::Duration::hours(amount)),
        "m" => Ok(chrono::Duration::minutes(amount)),
        _ => Err(BrokerError::InvalidInput {
            field: "since",
            message: format!("'{input}' — expected a number followed by d, h, or m"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_since_accepts_days_hours_minutes() {
        assert_eq!(parse_since("7d").unwrap(), chrono::Duration::days(7));
        assert_eq!(parse_since("24h").unwrap(), chrono::Duration::hours(24));
        assert_eq!(parse_since("30m").unwrap(), chrono::Duration::minutes(30));
    }

    #[test]
    fn parse_since_rejects_garbage() {
        assert!(parse_since("").is_err());
        assert!(parse_since("7x").is_err());
        assert!(parse_since("d").is_err());
        assert!(parse_since("-3h").is_err());
        assert!(parse_since("0m").is_err());
    }

    #[test]
    fn cli_parses_request_command() {
        let cli = Cli::try_parse_from([
            "2kc", "request", "deploy-key", "--reason", "ship", "--task", "T-1", "--env", "KEY",
            "--duration", "60", "--cmd", "printenv", "KEY",
        ])
        .unwrap();

        match cli.command {
            Commands::Request(args) => {
                assert_eq!(args.secrets, vec!["deploy-key"]);
                assert_eq!(args.reason, "ship");
                assert_eq!(args.task, "T-1");
                assert_eq!(args.env.as_deref(), Some("KEY"));
                assert_eq!(args.duration, Some(60));
                assert_eq!(args.cmd, vec!["printenv", "KEY"]);
            }
            _ => panic!("expected request command"),
        }
    }

    #[test]
    fn cli_requires_reason_and_task() {
        assert!(Cli::try_parse_from(["2kc", "request", "x", "--cmd", "true"]).is_err());
    }
}
