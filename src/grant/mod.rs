//! Grant manager — time-bound, single-use access grants.
//!
//! A grant is minted from an approved request and is valid until it is
//! used, revoked, or its expiry passes. The manager owns all grants
//! exclusively; callers only ever see copies. The grant map is the one
//! piece of shared mutable state in server mode, guarded by a single
//! mutex — every operation is one short critical section.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BrokerError, Result};
use crate::request::{AccessRequest, RequestStatus};

/// A single-use capability over a set of secret ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: String,
    pub request_id: String,
    pub secret_uuids: Vec<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Grant {
    /// A grant is valid iff it is unexpired, unused, and unrevoked.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at && !self.used && self.revoked_at.is_none()
    }
}

/// Owner of all grants. Grants reference secrets by uuid value only.
#[derive(Default)]
pub struct GrantManager {
    grants: Mutex<HashMap<String, Grant>>,
}

impl GrantManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a grant from an approved request.
    ///
    /// Fails `NotApproved` for any other request status. The secret
    /// uuid list is copied by value.
    pub fn create_grant(&self, request: &AccessRequest) -> Result<Grant> {
        if request.status != RequestStatus::Approved {
            return Err(BrokerError::NotApproved(request.id.clone()));
        }

        let now = Utc::now();
        let grant = Grant {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            secret_uuids: request.secret_uuids.clone(),
            granted_at: now,
            expires_at: now + Duration::seconds(request.duration_seconds as i64),
            used: false,
            revoked_at: None,
        };

        self.grants
            .lock()
            .expect("grant map poisoned")
            .insert(grant.id.clone(), grant.clone());
        Ok(grant)
    }

    /// True iff the grant exists and is currently valid.
    pub fn validate_grant(&self, id: &str) -> bool {
        let now = Utc::now();
        self.grants
            .lock()
            .expect("grant map poisoned")
            .get(id)
            .is_some_and(|g| g.is_valid_at(now))
    }

    /// Consume the grant. Fails `GrantNotFound` for an unknown id and
    /// `GrantNotValid` when the grant is used, revoked, or expired.
    pub fn mark_used(&self, id: &str) -> Result<()> {
        let now = Utc::now();
        let mut grants = self.grants.lock().expect("grant map poisoned");
        let grant = grants
            .get_mut(id)
            .ok_or_else(|| BrokerError::GrantNotFound(id.to_string()))?;
        if !grant.is_valid_at(now) {
            return Err(BrokerError::GrantNotValid(id.to_string()));
        }
        grant.used = true;
        Ok(())
    }

    /// Revoke the grant. Fails `GrantNotFound` for an unknown id and
    /// `AlreadyRevoked` on a second revocation.
    pub fn revoke_grant(&self, id: &str) -> Result<()> {
        let mut grants = self.grants.lock().expect("grant map poisoned");
        let grant = grants
            .get_mut(id)
            .ok_or_else(|| BrokerError::GrantNotFound(id.to_string()))?;
        if grant.revoked_at.is_some() {
            return Err(BrokerError::AlreadyRevoked(id.to_string()));
        }
        grant.revoked_at = Some(Utc::now());
        Ok(())
    }

    /// Drop every grant whose expiry has passed. Safe on empty.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.grants
            .lock()
            .expect("grant map poisoned")
            .retain(|_, g| now <= g.expires_at);
    }

    /// A deep copy of the grant, if present.
    pub fn get_grant(&self, id: &str) -> Option<Grant> {
        self.grants.lock().expect("grant map poisoned").get(id).cloned()
    }

    /// A copy of the grant's secret uuid list, if present.
    pub fn get_grant_secrets(&self, id: &str) -> Option<Vec<String>> {
        self.grants
            .lock()
            .expect("grant map poisoned")
            .get(id)
            .map(|g| g.secret_uuids.clone())
    }

    /// The id of the grant minted for a request, if any.
    pub fn find_by_request(&self, request_id: &str) -> Option<String> {
        self.grants
            .lock()
            .expect("grant map poisoned")
            .values()
            .find(|g| g.request_id == request_id)
            .map(|g| g.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved_request(duration: u64) -> AccessRequest {
        let mut req = AccessRequest::create(
            &[Uuid::new_v4().to_string()],
            "reason",
            "T-1",
            Some(duration),
        )
        .unwrap();
        req.status = RequestStatus::Approved;
        req
    }

    #[test]
    fn create_requires_approved_status() {
        let manager = GrantManager::new();
        let pending = AccessRequest::create(&[Uuid::new_v4().to_string()], "r", "t", None).unwrap();
        let err = manager.create_grant(&pending).unwrap_err();
        assert!(matches!(err, BrokerError::NotApproved(_)));
    }

    #[test]
    fn fresh_grant_is_valid_and_unused() {
        let manager = GrantManager::new();
        let grant = manager.create_grant(&approved_request(60)).unwrap();

        assert!(!grant.used);
        assert!(grant.revoked_at.is_none());
        assert!(manager.validate_grant(&grant.id));
        assert_eq!(grant.expires_at - grant.granted_at, Duration::seconds(60));
    }

    #[test]
    fn mark_used_is_single_shot() {
        let manager = GrantManager::new();
        let grant = manager.create_grant(&approved_request(60)).unwrap();

        manager.mark_used(&grant.id).unwrap();
        assert!(!manager.validate_grant(&grant.id));

        let err = manager.mark_used(&grant.id).unwrap_err();
        assert!(matches!(err, BrokerError::GrantNotValid(_)));
    }

    #[test]
    fn mark_used_unknown_grant_is_not_found() {
        let manager = GrantManager::new();
        let err = manager.mark_used("missing").unwrap_err();
        assert!(matches!(err, BrokerError::GrantNotFound(_)));
    }

    #[test]
    fn revoke_invalidates_and_double_revoke_fails() {
        let manager = GrantManager::new();
        let grant = manager.create_grant(&approved_request(60)).unwrap();

        manager.revoke_grant(&grant.id).unwrap();
        assert!(!manager.validate_grant(&grant.id));

        let err = manager.revoke_grant(&grant.id).unwrap_err();
        assert!(matches!(err, BrokerError::AlreadyRevoked(_)));

        let err = manager.mark_used(&grant.id).unwrap_err();
        assert!(matches!(err, BrokerError::GrantNotValid(_)));
    }

    #[test]
    fn expired_grant_fails_validation() {
        let manager = GrantManager::new();
        let grant = manager.create_grant(&approved_request(60)).unwrap();

        // Rewind the expiry instead of sleeping.
        {
            let mut grants = manager.grants.lock().unwrap();
            grants.get_mut(&grant.id).unwrap().expires_at = Utc::now() - Duration::seconds(1);
        }

        assert!(!manager.validate_grant(&grant.id));
        let err = manager.mark_used(&grant.id).unwrap_err();
        assert!(matches!(err, BrokerError::GrantNotValid(_)));
    }

    #[test]
    fn cleanup_reaps_only_expired_grants() {
        let manager = GrantManager::new();
        let live = manager.create_grant(&approved_request(600)).unwrap();
        let dead = manager.create_grant(&approved_request(60)).unwrap();

        {
            let mut grants = manager.grants.lock().unwrap();
            grants.get_mut(&dead.id).unwrap().expires_at = Utc::now() - Duration::seconds(1);
        }

        manager.cleanup();
        assert!(manager.get_grant(&live.id).is_some());
        assert!(manager.get_grant(&dead.id).is_none());

        // Safe when there is nothing left to reap.
        manager.cleanup();
    }

    #[test]
    fn getters_return_copies() {
        let manager = GrantManager::new();
        let grant = manager.create_grant(&approved_request(60)).unwrap();

        let mut copy = manager.get_grant(&grant.id).unwrap();
        copy.used = true;
        assert!(manager.validate_grant(&grant.id), "mutating a copy must not leak");

        let mut secrets = manager.get_grant_secrets(&grant.id).unwrap();
        secrets.clear();
        assert_eq!(manager.get_grant_secrets(&grant.id).unwrap().len(), 1);
    }

    #[test]
    fn find_by_request_maps_back() {
        let manager = GrantManager::new();
        let req = approved_request(60);
        let grant = manager.create_grant(&req).unwrap();

        assert_eq!(manager.find_by_request(&req.id).as_deref(), Some(grant.id.as_str()));
        assert!(manager.find_by_request("absent").is_none());
    }
}
