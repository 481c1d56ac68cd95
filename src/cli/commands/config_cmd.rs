//! `2kc config` — init and show.

use crate::cli::{output, Cli};
use crate::config::Config;
use crate::errors::{BrokerError, Result};

pub fn init(cli: &Cli) -> Result<()> {
    let path = match cli.config_path() {
        Some(p) => p.to_path_buf(),
        None => Config::default_path()?,
    };

    if path.exists() {
        return Err(BrokerError::ConfigError(format!(
            "config already exists at {}",
            path.display()
        )));
    }

    Config::default().save(&path)?;
    output::success(&format!("Wrote default config to {}", path.display()));
    output::tip("Run `2kc server token generate` before starting the server.");
    Ok(())
}

pub fn show(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config_path())?;
    let redacted = config.redacted_json()?;
    let pretty = serde_json::to_string_pretty(&redacted)
        .map_err(|e| BrokerError::SerializationError(format!("config: {e}")))?;
    println!("{pretty}");
    Ok(())
}
