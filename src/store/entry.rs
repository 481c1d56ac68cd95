//! Secret entry types stored in the broker's flat file.
//!
//! `SecretEntry` is the full on-disk record including the raw value.
//! `SecretListing` is the shape every listing and metadata operation
//! returns — it deliberately has no `value` field, so a secret value
//! can only leave the store through the explicit value getters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single secret as persisted in the store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEntry {
    /// RFC 4122 v4 identifier, unique across the store.
    pub uuid: String,

    /// Human slug identifier, unique across the store.
    #[serde(rename = "ref")]
    pub reference: String,

    /// The raw secret value.
    pub value: String,

    /// Free-form labels consumed by the approval policy.
    #[serde(default)]
    pub tags: Vec<String>,

    /// When this secret was first created.
    pub created_at: DateTime<Utc>,

    /// When this secret was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SecretEntry {
    /// The metadata-only view of this entry.
    pub fn listing(&self) -> SecretListing {
        SecretListing {
            uuid: self.uuid.clone(),
            reference: self.reference.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Metadata about a secret — never carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretListing {
    pub uuid: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A resolved `{uuid, value}` pair, used only by the injector for
/// placeholder substitution.
#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub uuid: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_drops_value() {
        let entry = SecretEntry {
            uuid: "u-1".into(),
            reference: "deploy-key".into(),
            value: "hunter2".into(),
            tags: vec!["dev".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let listing = entry.listing();
        let json = serde_json::to_value(&listing).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["ref"], "deploy-key");
        assert_eq!(json["uuid"], "u-1");
    }

    #[test]
    fn entry_serializes_with_camel_case_timestamps() {
        let entry = SecretEntry {
            uuid: "u-1".into(),
            reference: "api-key".into(),
            value: "v".into(),
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("created_at").is_none());
    }
}
