//! Service facade — one operation surface, two realizations.
//!
//! `BrokerService` is everything a caller can ask the broker to do.
//! `LocalBroker` executes in-process; `HttpBrokerClient` carries the
//! same calls over HTTP to a running server. The factory picks one
//! from the config's `mode` discriminant.

pub mod client;
pub mod local;

pub use client::HttpBrokerClient;
pub use local::LocalBroker;

use serde::{Deserialize, Serialize};

use crate::config::{Config, Mode};
use crate::errors::Result;
use crate::inject::InjectionResult;
use crate::request::AccessRequest;
use crate::store::SecretListing;

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    /// Seconds since the broker came up.
    pub uptime: f64,
    pub pid: u32,
}

/// The uniform broker operation surface.
pub trait BrokerService: Send + Sync {
    fn health(&self) -> Result<HealthInfo>;

    fn list_secrets(&self) -> Result<Vec<SecretListing>>;
    fn add_secret(&self, reference: &str, value: &str, tags: &[String]) -> Result<String>;
    fn remove_secret(&self, uuid: &str) -> Result<()>;
    fn get_metadata(&self, uuid: &str) -> Result<SecretListing>;
    fn resolve(&self, ref_or_uuid: &str) -> Result<SecretListing>;

    fn create_request(
        &self,
        secret_uuids: &[String],
        reason: &str,
        task_ref: &str,
        duration_seconds: Option<u64>,
    ) -> Result<AccessRequest>;

    /// Whether the request currently holds a valid grant. On a pending
    /// request this drives the approval workflow first.
    fn validate_grant(&self, request_id: &str) -> Result<bool>;

    fn inject(
        &self,
        request_id: &str,
        env_var_name: Option<&str>,
        command: &[String],
    ) -> Result<InjectionResult>;
}

/// Build the facade the config asks for.
pub fn broker_from_config(config: &Config) -> Result<Box<dyn BrokerService>> {
    match config.mode {
        Mode::Standalone => Ok(Box::new(LocalBroker::new(config)?)),
        Mode::Client => Ok(Box::new(HttpBrokerClient::new(config)?)),
    }
}
