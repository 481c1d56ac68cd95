//! `2kc secrets` — list, add, and remove secrets through the facade.

use crate::cli::{output, Cli};
use crate::config::Config;
use crate::errors::{BrokerError, Result};
use crate::service::broker_from_config;

pub fn list(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config_path())?;
    let broker = broker_from_config(&config)?;
    let secrets = broker.list_secrets()?;
    output::print_secrets_table(&secrets);
    Ok(())
}

pub fn add(cli: &Cli, reference: &str, value: Option<&str>, tags: &[String]) -> Result<()> {
    let config = Config::load(cli.config_path())?;
    let broker = broker_from_config(&config)?;

    // Prompt when the value wasn't given on the command line, so it
    // stays out of shell history.
    let value = match value {
        Some(v) => v.to_string(),
        None => dialoguer::Password::new()
            .with_prompt(format!("Value for '{reference}'"))
            .interact()
            .map_err(|e| BrokerError::CommandFailed(format!("value prompt: {e}")))?,
    };

    let uuid = broker.add_secret(reference, &value, tags)?;
    output::success(&format!("Added secret '{reference}'"));
    println!("{uuid}");
    Ok(())
}

pub fn remove(cli: &Cli, uuid: &str) -> Result<()> {
    let config = Config::load(cli.config_path())?;
    let broker = broker_from_config(&config)?;
    broker.remove_secret(uuid)?;
    output::success(&format!("Removed secret {uuid}"));
    Ok(())
}
