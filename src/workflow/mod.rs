//! Approval workflow — resolves the tag policy and drives a request
//! through the approval channel to a terminal status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::approval::{ApprovalChannel, Verdict};
use crate::config::Config;
use crate::errors::{BrokerError, Result};
use crate::request::{AccessRequest, RequestStatus};
use crate::store::{SecretListing, SecretStore};

/// Drives one request at a time; the caller owns the request and gets
/// its terminal status back by mutation.
pub struct WorkflowEngine {
    store: Arc<SecretStore>,
    channel: Option<Arc<dyn ApprovalChannel>>,
    require_approval: BTreeMap<String, bool>,
    default_require_approval: bool,
    approval_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<SecretStore>,
        channel: Option<Arc<dyn ApprovalChannel>>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            channel,
            require_approval: config.require_approval.clone(),
            default_require_approval: config.default_require_approval,
            approval_timeout: Duration::from_millis(config.approval_timeout_ms),
        }
    }

    /// Process the request to a terminal status.
    ///
    /// Auto-approves when no covered secret requires approval; any
    /// metadata or channel failure marks the request `Denied` and
    /// re-raises.
    pub fn process_request(&self, request: &mut AccessRequest) -> Result<Verdict> {
        let mut metas = Vec::with_capacity(request.secret_uuids.len());
        for uuid in &request.secret_uuids {
            match self.store.get_metadata(uuid) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    request.status = RequestStatus::Denied;
                    return Err(e);
                }
            }
        }

        let needs_approval = metas.iter().any(|m| self.secret_needs_approval(&m.tags));
        debug!(request_id = %request.id, needs_approval, "approval policy resolved");

        if !needs_approval {
            request.status = RequestStatus::Approved;
            return Ok(Verdict::Approved);
        }

        let Some(channel) = &self.channel else {
            request.status = RequestStatus::Denied;
            return Err(BrokerError::ApprovalChannelFailure(
                "approval required but no channel is configured — add a discord section to the config"
                    .into(),
            ));
        };

        let summary = build_summary(request, &metas);
        let verdict = (|| {
            let message_id = channel.send_approval_request(&summary)?;
            info!(request_id = %request.id, %message_id, "approval request posted");
            channel.wait_for_response(&message_id, self.approval_timeout)
        })();

        match verdict {
            Ok(v) => {
                request.status = match v {
                    Verdict::Approved => RequestStatus::Approved,
                    Verdict::Denied => RequestStatus::Denied,
                    Verdict::Timeout => RequestStatus::Timeout,
                };
                info!(request_id = %request.id, verdict = %v, "approval verdict recorded");
                Ok(v)
            }
            Err(e) => {
                request.status = RequestStatus::Denied;
                Err(e)
            }
        }
    }

    /// Per-secret policy: the first tag listed in `requireApproval`
    /// wins for that secret (an explicit `false` dominates the
    /// default); unlisted tags fall through to the default.
    fn secret_needs_approval(&self, tags: &[String]) -> bool {
        for tag in tags {
            if let Some(&required) = self.require_approval.get(tag) {
                return required;
            }
        }
        self.default_require_approval
    }
}

/// Human-readable channel summary: all uuids, all slugs, the
/// justification, and the requested duration.
fn build_summary(request: &AccessRequest, metas: &[SecretListing]) -> String {
    let requester = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());

    let secrets = metas
        .iter()
        .map(|m| format!("{} ({})", m.reference, m.uuid))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "🔐 Secret access request {id}\nRequester: {requester}\nSecrets: {secrets}\nReason: {reason}\nTask: {task}\nDuration: {duration}s\nReact ✅ to approve or ❌ to deny.",
        id = request.id,
        reason = request.reason,
        task = request.task_ref,
        duration = request.duration_seconds,
    )
}
