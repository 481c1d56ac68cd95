use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, Result};

/// Broker configuration, loaded from `~/.2kc/config.json`.
///
/// Every field has a sensible default so 2kc works out-of-the-box in
/// standalone mode without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Whether operations run in-process or against a broker server.
    #[serde(default)]
    pub mode: Mode,

    /// Server address and bearer token.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where the secret store file lives.
    #[serde(default)]
    pub store: StoreConfig,

    /// Discord approval channel settings, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordConfig>,

    /// Per-tag approval policy. `true` forces approval, `false` is an
    /// explicit opt-out that dominates the default for that secret.
    #[serde(default)]
    pub require_approval: BTreeMap<String, bool>,

    /// Policy applied when none of a secret's tags are listed.
    #[serde(default)]
    pub default_require_approval: bool,

    /// How long to wait for a human verdict.
    #[serde(default = "default_approval_timeout_ms")]
    pub approval_timeout_ms: u64,
}

/// Facade mode discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Standalone,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub bot_token: String,
    pub channel_id: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2274
}

fn default_store_path() -> String {
    "~/.2kc/secrets.json".to_string()
}

fn default_approval_timeout_ms() -> u64 {
    300_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            discord: None,
            require_approval: BTreeMap::new(),
            default_require_approval: false,
            approval_timeout_ms: default_approval_timeout_ms(),
        }
    }
}

// ── Implementation ───────────────────────────────────────────────────

impl Config {
    /// Load from the given path, or the default location when `None`.
    ///
    /// A missing file yields defaults; a file that exists but cannot
    /// be parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            BrokerError::ConfigError(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to the given path with mode `0600`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BrokerError::SerializationError(format!("config: {e}")))?;
        std::fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Structural sanity checks on top of serde parsing.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(BrokerError::ConfigError(
                "server.port must be in [1, 65535]".into(),
            ));
        }
        if self.approval_timeout_ms == 0 {
            return Err(BrokerError::ConfigError(
                "approvalTimeoutMs must be a positive integer".into(),
            ));
        }
        Ok(())
    }

    /// Default config file location: `~/.2kc/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(broker_home()?.join("config.json"))
    }

    /// The store file path with a leading `~` expanded to the user home.
    pub fn store_path(&self) -> Result<PathBuf> {
        expand_home(&self.store.path)
    }

    /// Base URL of the configured server.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// A JSON rendering safe to print: tokens and webhook URLs are
    /// cut down to recognizable prefixes.
    pub fn redacted_json(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| BrokerError::SerializationError(format!("config: {e}")))?;

        if let Some(token) = value.pointer_mut("/server/authToken") {
            if let Some(s) = token.as_str() {
                *token = serde_json::Value::String(truncated(s, 4));
            }
        }
        if let Some(token) = value.pointer_mut("/discord/botToken") {
            if let Some(s) = token.as_str() {
                *token = serde_json::Value::String(truncated(s, 4));
            }
        }
        if let Some(url) = value.pointer_mut("/discord/webhookUrl") {
            if let Some(s) = url.as_str() {
                *url = serde_json::Value::String(truncated(s, 20));
            }
        }
        Ok(value)
    }
}

/// `~/.2kc`, the broker's home directory.
pub fn broker_home() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| BrokerError::ConfigError("could not determine the user home directory".into()))?;
    Ok(PathBuf::from(home).join(".2kc"))
}

/// Expand a leading `~` to the user home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| {
                BrokerError::ConfigError("could not determine the user home directory".into())
            })?;
        return Ok(PathBuf::from(home).join(rest));
    }
    Ok(PathBuf::from(path))
}

fn truncated(s: &str, keep: usize) -> String {
    let prefix: String = s.chars().take(keep).collect();
    format!("{prefix}...")
}

// ── Tests ────────────────────────────────────────────────────────────
