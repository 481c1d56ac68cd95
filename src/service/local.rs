//! In-process facade: composes the store, request log, workflow,
//! grant manager, and injector behind the `BrokerService` surface.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::approval::{ApprovalChannel, DiscordChannel, Verdict};
use crate::config::Config;
use crate::errors::{BrokerError, Result};
use crate::grant::GrantManager;
use crate::inject::{InjectionOptions, InjectionResult, Injector};
use crate::request::{AccessRequest, RequestLog, RequestStatus};
use crate::store::{SecretListing, SecretStore};
use crate::workflow::WorkflowEngine;

use super::{BrokerService, HealthInfo};

pub struct LocalBroker {
    store: Arc<SecretStore>,
    requests: RequestLog,
    grants: Arc<GrantManager>,
    workflow: WorkflowEngine,
    injector: Injector,
    started_at: Instant,
}

impl LocalBroker {
    /// Build from config: store path and, when configured, the Discord
    /// approval channel.
    pub fn new(config: &Config) -> Result<Self> {
        let store = Arc::new(SecretStore::new(config.store_path()?));
        let channel: Option<Arc<dyn ApprovalChannel>> = config.discord.as_ref().map(|d| {
            Arc::new(DiscordChannel::new(&d.webhook_url, &d.bot_token, &d.channel_id))
                as Arc<dyn ApprovalChannel>
        });
        Ok(Self::with_parts(store, channel, config))
    }

    /// Assembly seam: tests substitute a stub channel and a temp store.
    pub fn with_parts(
        store: Arc<SecretStore>,
        channel: Option<Arc<dyn ApprovalChannel>>,
        config: &Config,
    ) -> Self {
        let grants = Arc::new(GrantManager::new());
        Self {
            workflow: WorkflowEngine::new(store.clone(), channel, config),
            injector: Injector::new(store.clone(), grants.clone()),
            requests: RequestLog::new(),
            store,
            grants,
            started_at: Instant::now(),
        }
    }

    /// The grant backing a request, minting one if the request just
    /// got approved.
    ///
    /// An expired grant is still returned here so the injector can
    /// report it as invalid rather than unapproved; reaping happens
    /// in `validate_grant` after the verdict is taken.
    fn grant_for_request(&self, request_id: &str) -> Result<Option<String>> {
        if let Some(grant_id) = self.grants.find_by_request(request_id) {
            return Ok(Some(grant_id));
        }

        let Some(mut request) = self.requests.get(request_id) else {
            return Err(BrokerError::RequestNotFound(request_id.to_string()));
        };

        match request.status {
            RequestStatus::Pending => {
                let outcome = self.workflow.process_request(&mut request);
                self.requests.set_status(request_id, request.status);
                match outcome? {
                    Verdict::Approved => {
                        let grant = self.grants.create_grant(&request)?;
                        debug!(request_id, grant_id = %grant.id, "grant minted");
                        Ok(Some(grant.id))
                    }
                    _ => Ok(None),
                }
            }
            // Approved but unreaped/unminted (e.g. the grant expired
            // and was cleaned up): the capability is spent.
            _ => Ok(None),
        }
    }
}

impl BrokerService for LocalBroker {
    fn health(&self) -> Result<HealthInfo> {
        Ok(HealthInfo {
            status: "ok".into(),
            uptime: self.started_at.elapsed().as_secs_f64(),
            pid: std::process::id(),
        })
    }

    fn list_secrets(&self) -> Result<Vec<SecretListing>> {
        self.store.list()
    }

    fn add_secret(&self, reference: &str, value: &str, tags: &[String]) -> Result<String> {
        self.store.add(reference, value, tags)
    }

    fn remove_secret(&self, uuid: &str) -> Result<()> {
        self.store.remove(uuid)
    }

    fn get_metadata(&self, uuid: &str) -> Result<SecretListing> {
        self.store.get_metadata(uuid)
    }

    fn resolve(&self, ref_or_uuid: &str) -> Result<SecretListing> {
        self.store.resolve(ref_or_uuid)
    }

    fn create_request(
        &self,
        secret_uuids: &[String],
        reason: &str,
        task_ref: &str,
        duration_seconds: Option<u64>,
    ) -> Result<AccessRequest> {
        // Field-level validation only; whether the secrets exist is
        // the workflow's concern when the request is processed.
        let request = AccessRequest::create(secret_uuids, reason, task_ref, duration_seconds)?;
        self.requests.append(request.clone());
        Ok(request)
    }

    fn validate_grant(&self, request_id: &str) -> Result<bool> {
        let valid = match self.grant_for_request(request_id)? {
            Some(grant_id) => self.grants.validate_grant(&grant_id),
            None => false,
        };
        // Opportunistic reap once the verdict is taken.
        self.grants.cleanup();
        Ok(valid)
    }

    fn inject(
        &self,
        request_id: &str,
        env_var_name: Option<&str>,
        command: &[String],
    ) -> Result<InjectionResult> {
        let grant_id = self
            .grant_for_request(request_id)?
            .ok_or_else(|| BrokerError::NotApproved(request_id.to_string()))?;

        let options = InjectionOptions {
            env_var_name: env_var_name.map(str::to_string),
            timeout_ms: None,
        };
        self.injector.inject(&grant_id, command, &options)
    }
}
