//! High-level store operations used by the facade and the injector.
//!
//! `SecretStore` wraps the on-disk JSON document so the rest of the
//! application can work with simple method calls like
//! `store.add("deploy-key", "...", tags)`. Every mutating operation
//! reloads the document from disk, applies the change, and writes the
//! whole document back with mode `0600` reapplied.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::errors::{BrokerError, Result};

use super::entry::{ResolvedSecret, SecretEntry, SecretListing};

/// The on-disk document: `{"secrets": [entry, ...]}`.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StoreDocument {
    #[serde(default)]
    secrets: Vec<SecretEntry>,
}

/// Pattern a human slug must match.
fn ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static pattern"))
}

/// Returns `true` if the input parses as an RFC 4122 v4 uuid.
pub fn is_uuid_v4(input: &str) -> bool {
    matches!(
        Uuid::try_parse(input).map(|u| u.get_version()),
        Ok(Some(uuid::Version::Random))
    )
}

/// The main store handle. Holds only the file path; all state lives
/// on disk so concurrent broker processes observe each other's writes.
pub struct SecretStore {
    /// Path to the `secrets.json` file.
    path: PathBuf,
}

impl SecretStore {
    /// Create a store handle for the given file path.
    ///
    /// The file is not touched until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Add a secret and return its generated uuid.
    ///
    /// Fails `InvalidInput` on a malformed ref and `DuplicateRef` when
    /// the slug is already taken. Tags are deduplicated preserving order.
    pub fn add(&self, reference: &str, value: &str, tags: &[String]) -> Result<String> {
        validate_ref(reference)?;

        let mut doc = self.load()?;
        if doc.secrets.iter().any(|s| s.reference == reference) {
            return Err(BrokerError::DuplicateRef(reference.to_string()));
        }

        let mut seen = Vec::with_capacity(tags.len());
        for tag in tags {
            if !seen.contains(tag) {
                seen.push(tag.clone());
            }
        }

        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now();
        doc.secrets.push(SecretEntry {
            uuid: uuid.clone(),
            reference: reference.to_string(),
            value: value.to_string(),
            tags: seen,
            created_at: now,
            updated_at: now,
        });

        self.save(&doc)?;
        Ok(uuid)
    }

    /// Remove a secret by uuid. Fails `NotFound` if absent.
    pub fn remove(&self, uuid: &str) -> Result<()> {
        let mut doc = self.load()?;
        let before = doc.secrets.len();
        doc.secrets.retain(|s| s.uuid != uuid);
        if doc.secrets.len() == before {
            return Err(BrokerError::NotFound(format!("uuid {uuid}")));
        }
        self.save(&doc)
    }

    /// List all secrets in insertion order, metadata only.
    pub fn list(&self) -> Result<Vec<SecretListing>> {
        let doc = self.load()?;
        Ok(doc.secrets.iter().map(SecretEntry::listing).collect())
    }

    /// Metadata for a single secret by uuid.
    pub fn get_metadata(&self, uuid: &str) -> Result<SecretListing> {
        let doc = self.load()?;
        doc.secrets
            .iter()
            .find(|s| s.uuid == uuid)
            .map(SecretEntry::listing)
            .ok_or_else(|| BrokerError::NotFound(format!("uuid {uuid}")))
    }

    /// Metadata for a single secret by ref.
    pub fn get_by_ref(&self, reference: &str) -> Result<SecretListing> {
        let doc = self.load()?;
        doc.secrets
            .iter()
            .find(|s| s.reference == reference)
            .map(SecretEntry::listing)
            .ok_or_else(|| BrokerError::NotFound(format!("ref '{reference}'")))
    }

    /// Raw value of a secret by uuid.
    pub fn get_value(&self, uuid: &str) -> Result<String> {
        let doc = self.load()?;
        doc.secrets
            .iter()
            .find(|s| s.uuid == uuid)
            .map(|s| s.value.clone())
            .ok_or_else(|| BrokerError::NotFound(format!("uuid {uuid}")))
    }

    /// Raw value of a secret by ref.
    pub fn get_value_by_ref(&self, reference: &str) -> Result<String> {
        let doc = self.load()?;
        doc.secrets
            .iter()
            .find(|s| s.reference == reference)
            .map(|s| s.value.clone())
            .ok_or_else(|| BrokerError::NotFound(format!("ref '{reference}'")))
    }

    /// Resolve a ref-or-uuid to metadata.
    ///
    /// Input matching the uuid v4 pattern dispatches to uuid lookup,
    /// anything else to ref lookup; the `NotFound` message records
    /// which path was taken.
    pub fn resolve(&self, ref_or_uuid: &str) -> Result<SecretListing> {
        if is_uuid_v4(ref_or_uuid) {
            self.get_metadata(ref_or_uuid)
        } else {
            self.get_by_ref(ref_or_uuid)
        }
    }

    /// Resolve a ref-or-uuid to `{uuid, value}`.
    ///
    /// Used only by the injector for placeholder substitution.
    pub fn resolve_ref(&self, ref_or_uuid: &str) -> Result<ResolvedSecret> {
        let doc = self.load()?;
        let entry = if is_uuid_v4(ref_or_uuid) {
            doc.secrets.iter().find(|s| s.uuid == ref_or_uuid).ok_or_else(|| {
                BrokerError::NotFound(format!("uuid {ref_or_uuid}"))
            })?
        } else {
            doc.secrets.iter().find(|s| s.reference == ref_or_uuid).ok_or_else(|| {
                BrokerError::NotFound(format!("ref '{ref_or_uuid}'"))
            })?
        };
        Ok(ResolvedSecret {
            uuid: entry.uuid.clone(),
            value: entry.value.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Read and parse the store file.
    ///
    /// A missing file yields an empty document; a file that exists but
    /// fails to parse is `Corrupted` — never silently reset.
    fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| BrokerError::Corrupted {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }

    /// Write the whole document back and reapply mode `0600`.
    ///
    /// Writes go through a temp file in the same directory so readers
    /// never observe a half-written document.
    fn save(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| BrokerError::SerializationError(format!("store: {e}")))?;

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));

        std::fs::write(&tmp_path, json)?;
        restrict_mode(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;
        restrict_mode(&self.path)?;

        Ok(())
    }
}

/// Set owner-only permissions on the store file.
#[cfg(unix)]
fn restrict_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> Result<()> {
    Ok(())
}

/// Validate a human slug.
///
/// Must match `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$` and must not itself be
/// a v4 uuid, so the two lookup namespaces can never collide.
fn validate_ref(reference: &str) -> Result<()> {
    if !ref_pattern().is_match(reference) {
        return Err(BrokerError::InvalidInput {
            field: "ref",
            message: format!(
                "'{reference}' — only lowercase letters, digits, and interior hyphens are allowed"
            ),
        });
    }
    if is_uuid_v4(reference) {
        return Err(BrokerError::InvalidInput {
            field: "ref",
            message: format!("'{reference}' is a uuid; refs must not collide with the uuid namespace"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SecretStore {
        SecretStore::new(dir.path().join("secrets.json"))
    }

    #[test]
    fn add_and_get_value_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let uuid = store.add("deploy-key", "s3cr3t", &["dev".into()]).unwrap();
        assert_eq!(store.get_value(&uuid).unwrap(), "s3cr3t");
        assert_eq!(store.get_value_by_ref("deploy-key").unwrap(), "s3cr3t");
    }

    #[test]
    fn add_rejects_duplicate_ref() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add("deploy-key", "a", &[]).unwrap();
        let err = store.add("deploy-key", "b", &[]).unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateRef(_)));
    }

    #[test]
    fn add_rejects_bad_refs() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for bad in ["", "-leading", "trailing-", "UPPER", "under_score", "sp ace"] {
            assert!(store.add(bad, "v", &[]).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn add_rejects_uuid_shaped_ref() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let uuid_ref = Uuid::new_v4().to_string();
        let err = store.add(&uuid_ref, "v", &[]).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidInput { field: "ref", .. }));
    }

    #[test]
    fn add_deduplicates_tags_preserving_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let uuid = store
            .add(
                "api-key",
                "v",
                &["prod".into(), "dev".into(), "prod".into()],
            )
            .unwrap();
        let meta = store.get_metadata(&uuid).unwrap();
        assert_eq!(meta.tags, vec!["prod".to_string(), "dev".to_string()]);
    }

    #[test]
    fn list_has_no_value_and_keeps_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add("first", "1", &[]).unwrap();
        store.add("second", "2", &[]).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].reference, "first");
        assert_eq!(listed[1].reference, "second");

        let json = serde_json::to_value(&listed).unwrap();
        assert!(json[0].get("value").is_none());
    }

    #[test]
    fn remove_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store.remove("no-such-uuid").unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[test]
    fn resolve_dispatches_on_shape() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let uuid = store.add("db-url", "postgres://x", &[]).unwrap();

        assert_eq!(store.resolve(&uuid).unwrap().reference, "db-url");
        assert_eq!(store.resolve("db-url").unwrap().uuid, uuid);
        assert_eq!(store.resolve_ref("db-url").unwrap().value, "postgres://x");
    }

    #[test]
    fn resolve_not_found_names_the_path_taken() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let missing_uuid = Uuid::new_v4().to_string();
        let err = store.resolve(&missing_uuid).unwrap_err();
        assert!(err.to_string().contains("uuid"));

        let err = store.resolve("missing-ref").unwrap_err();
        assert!(err.to_string().contains("ref"));
    }

    #[test]
    fn corrupted_file_is_not_silently_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, "not json {{").unwrap();

        let store = SecretStore::new(&path);
        let err = store.list().unwrap_err();
        assert!(matches!(err, BrokerError::Corrupted { .. }));
        assert!(err.to_string().contains("secrets.json"));

        // The broken file must survive untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json {{");
    }

    #[cfg(unix)]
    #[test]
    fn store_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add("key", "v", &[]).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
