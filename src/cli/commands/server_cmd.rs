//! `2kc server` — start, stop, status, and token management.

use uuid::Uuid;

use crate::cli::{output, Cli};
use crate::config::Config;
use crate::errors::Result;
use crate::server::daemon::{self, ServerStatus};

pub fn start(cli: &Cli, foreground: bool) -> Result<()> {
    let config = Config::load(cli.config_path())?;

    if foreground {
        return daemon::run_foreground(config);
    }

    // Fail the startup preconditions here, not in the detached child
    // where the error would only land in the log file.
    config.validate()?;
    let pid = daemon::start_detached(cli.config.as_ref())?;
    output::success(&format!("Server started (pid {pid})"));
    output::tip(&format!("Logs: {}", daemon::log_path()?.display()));
    Ok(())
}

pub fn stop(_cli: &Cli) -> Result<()> {
    daemon::stop()?;
    output::success("Server stopped");
    Ok(())
}

pub fn status(_cli: &Cli) -> Result<()> {
    match daemon::status()? {
        ServerStatus::Running(pid) => output::info(&format!("Server is running (pid {pid})")),
        ServerStatus::Stopped => output::info("Server is not running"),
    }
    Ok(())
}

pub fn token_generate(cli: &Cli) -> Result<()> {
    let path = match cli.config_path() {
        Some(p) => p.to_path_buf(),
        None => Config::default_path()?,
    };

    let mut config = Config::load(Some(&path))?;
    let token = generate_token();
    config.server.auth_token = Some(token.clone());
    config.save(&path)?;

    output::success("Generated a new server auth token");
    println!("{token}");
    Ok(())
}

/// 256 bits of v4-uuid entropy, hex, no separators.
fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
