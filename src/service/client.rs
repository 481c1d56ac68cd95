//! HTTP facade: the same operations as `LocalBroker`, carried as JSON
//! over the wire to a running broker server.
//!
//! Every call attaches the configured bearer token and gives up after
//! 30 seconds. Transport failures are translated into messages a CLI
//! user can act on.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::errors::{BrokerError, Result};
use crate::inject::InjectionResult;
use crate::request::AccessRequest;
use crate::store::SecretListing;

use super::{BrokerService, HealthInfo};

/// Per-call deadline.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct HttpBrokerClient {
    base_url: String,
    auth_token: String,
    agent: ureq::Agent,
}

impl HttpBrokerClient {
    /// Fails at construction when client mode has no bearer token —
    /// there is no anonymous surface beyond `/health`.
    pub fn new(config: &Config) -> Result<Self> {
        let auth_token = config
            .server
            .auth_token
            .clone()
            .ok_or_else(|| {
                BrokerError::ConfigError(
                    "client mode requires server.authToken — run `2kc server token generate`".into(),
                )
            })?;

        Ok(Self {
            base_url: config.server_url(),
            auth_token,
            agent: ureq::AgentBuilder::new().timeout(CALL_TIMEOUT).build(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .agent
            .get(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.auth_token))
            .call()
            .map_err(|e| self.map_error(e))?;
        response
            .into_json()
            .map_err(|e| BrokerError::SerializationError(format!("response body: {e}")))
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .agent
            .post(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.auth_token))
            .send_json(body)
            .map_err(|e| self.map_error(e))?;
        response
            .into_json()
            .map_err(|e| BrokerError::SerializationError(format!("response body: {e}")))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.agent
            .delete(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.auth_token))
            .call()
            .map(|_| ())
            .map_err(|e| self.map_error(e))
    }

    /// Translate transport and status errors into domain messages.
    fn map_error(&self, err: ureq::Error) -> BrokerError {
        match err {
            ureq::Error::Status(401, _) => BrokerError::AuthFailure,
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_json::<serde_json::Value>()
                    .ok()
                    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                    .unwrap_or_else(|| format!("status {status}"));
                match status {
                    404 => BrokerError::NotFound(message),
                    _ => BrokerError::ServerError(message),
                }
            }
            ureq::Error::Transport(transport) => {
                let detail = transport.to_string();
                if detail.contains("timed out") || detail.contains("timeout") {
                    BrokerError::RequestTimedOut(CALL_TIMEOUT.as_secs())
                } else {
                    BrokerError::ServerNotRunning(self.base_url.clone())
                }
            }
        }
    }
}

impl BrokerService for HttpBrokerClient {
    fn health(&self) -> Result<HealthInfo> {
        self.get_json("/health")
    }

    fn list_secrets(&self) -> Result<Vec<SecretListing>> {
        self.get_json("/api/secrets")
    }

    fn add_secret(&self, reference: &str, value: &str, tags: &[String]) -> Result<String> {
        let body: serde_json::Value = self.post_json(
            "/api/secrets",
            serde_json::json!({ "ref": reference, "value": value, "tags": tags }),
        )?;
        body.get("uuid")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| BrokerError::SerializationError("response had no uuid".into()))
    }

    fn remove_secret(&self, uuid: &str) -> Result<()> {
        self.delete(&format!("/api/secrets/{uuid}"))
    }

    fn get_metadata(&self, uuid: &str) -> Result<SecretListing> {
        self.get_json(&format!("/api/secrets/{uuid}"))
    }

    fn resolve(&self, ref_or_uuid: &str) -> Result<SecretListing> {
        self.get_json(&format!("/api/secrets/resolve/{ref_or_uuid}"))
    }

    fn create_request(
        &self,
        secret_uuids: &[String],
        reason: &str,
        task_ref: &str,
        duration_seconds: Option<u64>,
    ) -> Result<AccessRequest> {
        let mut body = serde_json::json!({
            "secretUuids": secret_uuids,
            "reason": reason,
            "taskRef": task_ref,
        });
        if let Some(duration) = duration_seconds {
            body["duration"] = duration.into();
        }
        self.post_json("/api/requests", body)
    }

    fn validate_grant(&self, request_id: &str) -> Result<bool> {
        self.get_json(&format!("/api/grants/{request_id}"))
    }

    fn inject(
        &self,
        request_id: &str,
        env_var_name: Option<&str>,
        command: &[String],
    ) -> Result<InjectionResult> {
        self.post_json(
            "/api/inject",
            serde_json::json!({
                "requestId": request_id,
                "envVarName": env_var_name,
                "command": command,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    #[test]
    fn construction_requires_auth_token() {
        let mut config = Config::default();
        config.mode = Mode::Client;
        let err = HttpBrokerClient::new(&config).unwrap_err();
        assert!(matches!(err, BrokerError::ConfigError(_)));
        assert!(err.to_string().contains("authToken"));
    }

    #[test]
    fn unreachable_server_maps_to_server_not_running() {
        let mut config = Config::default();
        config.server.port = 1; // nothing listens here
        config.server.auth_token = Some("tok".into());

        let client = HttpBrokerClient::new(&config).unwrap();
        let err = client.health().unwrap_err();
        assert!(matches!(err, BrokerError::ServerNotRunning(_)));
        assert!(err.to_string().contains("2kc server start"));
    }
}
