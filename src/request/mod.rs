//! Access request model and the in-memory request log.
//!
//! An `AccessRequest` captures one attempt to use one or more secrets:
//! which secrets, why, for which task, and for how long. Requests are
//! created `Pending` and moved exactly once to a terminal status by
//! the workflow engine. They are not persisted.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BrokerError, Result};

/// Bounds and default for the requested grant duration, in seconds.
pub const MIN_DURATION_SECS: u64 = 30;
pub const MAX_DURATION_SECS: u64 = 3600;
pub const DEFAULT_DURATION_SECS: u64 = 300;

/// Lifecycle status of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Timeout,
    Expired,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
            RequestStatus::Timeout => "timeout",
            RequestStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// One access attempt with its justification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: String,
    pub secret_uuids: Vec<String>,
    pub reason: String,
    pub task_ref: String,
    pub duration_seconds: u64,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

impl AccessRequest {
    /// Validate fields and build a pending request.
    ///
    /// `secret_uuids` is deduplicated preserving order; `reason` and
    /// `task_ref` must be non-empty after trimming; the duration must
    /// fall in `[MIN_DURATION_SECS, MAX_DURATION_SECS]`.
    pub fn create(
        secret_uuids: &[String],
        reason: &str,
        task_ref: &str,
        duration_seconds: Option<u64>,
    ) -> Result<Self> {
        let mut uuids: Vec<String> = Vec::with_capacity(secret_uuids.len());
        for u in secret_uuids {
            if !uuids.contains(u) {
                uuids.push(u.clone());
            }
        }
        if uuids.is_empty() {
            return Err(BrokerError::InvalidInput {
                field: "secretUuids",
                message: "at least one secret uuid is required".into(),
            });
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BrokerError::InvalidInput {
                field: "reason",
                message: "a justification is required".into(),
            });
        }

        let task_ref = task_ref.trim();
        if task_ref.is_empty() {
            return Err(BrokerError::InvalidInput {
                field: "taskRef",
                message: "a task reference is required".into(),
            });
        }

        let duration = duration_seconds.unwrap_or(DEFAULT_DURATION_SECS);
        if duration < MIN_DURATION_SECS {
            return Err(BrokerError::InvalidInput {
                field: "durationSeconds",
                message: format!("{duration} is below the minimum of {MIN_DURATION_SECS} seconds"),
            });
        }
        if duration > MAX_DURATION_SECS {
            return Err(BrokerError::InvalidInput {
                field: "durationSeconds",
                message: format!("{duration} exceeds the maximum of {MAX_DURATION_SECS} seconds"),
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            secret_uuids: uuids,
            reason: reason.to_string(),
            task_ref: task_ref.to_string(),
            duration_seconds: duration,
            requested_at: Utc::now(),
            status: RequestStatus::Pending,
        })
    }
}

/// Append-only in-memory log of requests.
///
/// Reads hand out copies so callers can never alias internal state.
#[derive(Default)]
pub struct RequestLog {
    entries: Mutex<Vec<AccessRequest>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the log.
    pub fn append(&self, request: AccessRequest) {
        self.entries.lock().expect("request log poisoned").push(request);
    }

    /// Snapshot of every logged request.
    pub fn get_all(&self) -> Vec<AccessRequest> {
        self.entries.lock().expect("request log poisoned").clone()
    }

    /// Look up a request by id.
    pub fn get(&self, id: &str) -> Option<AccessRequest> {
        self.entries
            .lock()
            .expect("request log poisoned")
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// All requests that cover the given secret uuid.
    pub fn filter_by_secret(&self, secret_uuid: &str) -> Vec<AccessRequest> {
        self.entries
            .lock()
            .expect("request log poisoned")
            .iter()
            .filter(|r| r.secret_uuids.iter().any(|u| u == secret_uuid))
            .cloned()
            .collect()
    }

    /// Overwrite the stored status for a request.
    ///
    /// The workflow engine processes a copy and transfers the terminal
    /// status back through this call.
    pub fn set_status(&self, id: &str, status: RequestStatus) {
        let mut entries = self.entries.lock().expect("request log poisoned");
        if let Some(r) = entries.iter_mut().find(|r| r.id == id) {
            r.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuids(n: usize) -> Vec<String> {
        (0..n).map(|_| Uuid::new_v4().to_string()).collect()
    }

    #[test]
    fn create_defaults_and_pending_status() {
        let req = AccessRequest::create(&uuids(1), "ship it", "T-1", None).unwrap();
        assert_eq!(req.duration_seconds, DEFAULT_DURATION_SECS);
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(Uuid::try_parse(&req.id).is_ok());
    }

    #[test]
    fn create_deduplicates_uuids_preserving_order() {
        let ids = uuids(2);
        let input = vec![ids[0].clone(), ids[1].clone(), ids[0].clone()];
        let req = AccessRequest::create(&input, "r", "t", None).unwrap();
        assert_eq!(req.secret_uuids, ids);
    }

    #[test]
    fn create_rejects_empty_uuid_list() {
        let err = AccessRequest::create(&[], "r", "t", None).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidInput { field: "secretUuids", .. }));
    }

    #[test]
    fn create_rejects_blank_reason_and_task() {
        let ids = uuids(1);
        assert!(AccessRequest::create(&ids, "   ", "t", None).is_err());
        assert!(AccessRequest::create(&ids, "r", "\t", None).is_err());
    }

    #[test]
    fn create_rejects_out_of_range_durations_distinctly() {
        let ids = uuids(1);

        let low = AccessRequest::create(&ids, "r", "t", Some(29)).unwrap_err();
        assert!(low.to_string().contains("below the minimum"));

        let high = AccessRequest::create(&ids, "r", "t", Some(3601)).unwrap_err();
        assert!(high.to_string().contains("exceeds the maximum"));

        assert!(AccessRequest::create(&ids, "r", "t", Some(30)).is_ok());
        assert!(AccessRequest::create(&ids, "r", "t", Some(3600)).is_ok());
    }

    #[test]
    fn log_snapshot_defeats_aliasing() {
        let log = RequestLog::new();
        let req = AccessRequest::create(&uuids(1), "r", "t", None).unwrap();
        let id = req.id.clone();
        log.append(req);

        let mut snapshot = log.get_all();
        snapshot[0].status = RequestStatus::Denied;

        assert_eq!(log.get(&id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn log_filters_by_secret_membership() {
        let log = RequestLog::new();
        let ids = uuids(2);
        log.append(AccessRequest::create(&ids[..1].to_vec(), "r", "t", None).unwrap());
        log.append(AccessRequest::create(&ids[1..].to_vec(), "r", "t", None).unwrap());

        assert_eq!(log.filter_by_secret(&ids[0]).len(), 1);
        assert_eq!(log.filter_by_secret(&ids[1]).len(), 1);
        assert!(log.filter_by_secret("absent").is_empty());
    }

    #[test]
    fn set_status_transfers_terminal_state() {
        let log = RequestLog::new();
        let req = AccessRequest::create(&uuids(1), "r", "t", None).unwrap();
        let id = req.id.clone();
        log.append(req);

        log.set_status(&id, RequestStatus::Approved);
        assert_eq!(log.get(&id).unwrap().status, RequestStatus::Approved);
    }
}
