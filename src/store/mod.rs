//! Secret store module — file-backed secret storage.
//!
//! This module provides:
//! - `SecretEntry` and `SecretListing` types (`entry`)
//! - High-level `SecretStore` for adding, removing, and resolving secrets (`store`)

pub mod entry;
pub mod store;

// Re-export the most commonly used items.
pub use entry::{ResolvedSecret, SecretEntry, SecretListing};
pub use store::{is_uuid_v4, SecretStore};
