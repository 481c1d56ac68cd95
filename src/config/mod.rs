//! Config module — the `~/.2kc/config.json` file.

pub mod settings;

pub use settings::{broker_home, Config, DiscordConfig, Mode, ServerConfig, StoreConfig};
