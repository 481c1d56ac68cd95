use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in 2kc.
#[derive(Debug, Error)]
pub enum BrokerError {
    // --- Input validation ---
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    // --- Store errors ---
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("A secret with ref '{0}' already exists")]
    DuplicateRef(String),

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Secret store at {path} is corrupted: {detail}")]
    Corrupted { path: PathBuf, detail: String },

    // --- Grant errors ---
    #[error("Request {0} is not approved")]
    NotApproved(String),

    #[error("Grant not found: {0}")]
    GrantNotFound(String),

    #[error("Grant is not valid: {0}")]
    GrantNotValid(String),

    #[error("Grant {0} is already revoked")]
    AlreadyRevoked(String),

    // --- Injector errors ---
    #[error("No command specified — pass the command to run after --")]
    EmptyCommand,

    #[error("Env var {env_var} holds placeholder {placeholder} resolving to {uuid}, which is outside the grant")]
    PlaceholderOutOfScope {
        env_var: String,
        placeholder: String,
        uuid: String,
    },

    #[error("Failed to spawn child process: {0}")]
    SpawnFailure(String),

    #[error("Child output exceeded the {limit}-byte buffer cap")]
    BufferExceeded { limit: u64 },

    #[error("Child process exceeded the {0} ms time budget")]
    Timeout(u64),

    // --- Approval channel ---
    #[error("Approval channel failure: {0}")]
    ApprovalChannelFailure(String),

    // --- HTTP client ---
    #[error("Server not running at {0} — start it with `2kc server start`")]
    ServerNotRunning(String),

    #[error("Authentication failed — check server.authToken in your 2kc config")]
    AuthFailure,

    #[error("Request timed out after {0} seconds")]
    RequestTimedOut(u64),

    #[error("Server error: {0}")]
    ServerError(String),

    // --- Config errors ---
    #[error("Config error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    AuditError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Convenience type alias for 2kc results.
pub type Result<T> = std::result::Result<T, BrokerError>;
