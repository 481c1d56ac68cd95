//! Route handlers. Each one bridges into the synchronous broker core
//! via `spawn_blocking` — approval polls and child waits can hold a
//! worker thread for minutes and must not starve the async runtime.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::errors::{BrokerError, Result};
use crate::inject::InjectionResult;
use crate::request::AccessRequest;
use crate::service::BrokerService;
use crate::store::SecretListing;

use super::state::AppState;

/// JSON error envelope: `{error, statusCode}`. Internal errors elide
/// their message.
pub struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrokerError::InvalidInput { .. } | BrokerError::EmptyCommand => StatusCode::BAD_REQUEST,
            BrokerError::NotFound(_)
            | BrokerError::RequestNotFound(_)
            | BrokerError::GrantNotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::DuplicateRef(_) => StatusCode::CONFLICT,
            BrokerError::NotApproved(_)
            | BrokerError::GrantNotValid(_)
            | BrokerError::AlreadyRevoked(_)
            | BrokerError::PlaceholderOutOfScope { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "internal error");
            "Internal Server Error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "statusCode": status.as_u16(),
            })),
        )
            .into_response()
    }
}

/// Run a blocking broker call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrokerError::ServerError(format!("worker task failed: {e}")))?
}

// ── Routes ───────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let info = state.broker.health()?;
    Ok(Json(serde_json::json!({
        "status": info.status,
        "uptime": info.uptime,
        "pid": info.pid,
    })))
}

pub async fn list_secrets(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<SecretListing>>, ApiError> {
    let broker = state.broker.clone();
    Ok(Json(blocking(move || broker.list_secrets()).await?))
}

#[derive(Deserialize)]
pub struct AddSecretBody {
    #[serde(rename = "ref")]
    reference: String,
    value: String,
    #[serde(default)]
    tags: Vec<String>,
}

pub async fn add_secret(
    State(state): State<AppState>,
    Json(body): Json<AddSecretBody>,
) -> std::result::Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let broker = state.broker.clone();
    let uuid = blocking(move || broker.add_secret(&body.reference, &body.value, &body.tags)).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "uuid": uuid }))))
}

pub async fn get_secret(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> std::result::Result<Json<SecretListing>, ApiError> {
    let broker = state.broker.clone();
    Ok(Json(blocking(move || broker.get_metadata(&uuid)).await?))
}

pub async fn resolve_secret(
    State(state): State<AppState>,
    Path(ref_or_uuid): Path<String>,
) -> std::result::Result<Json<SecretListing>, ApiError> {
    let broker = state.broker.clone();
    Ok(Json(blocking(move || broker.resolve(&ref_or_uuid)).await?))
}

pub async fn remove_secret(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let broker = state.broker.clone();
    blocking(move || broker.remove_secret(&uuid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    secret_uuids: Vec<String>,
    reason: String,
    task_ref: String,
    duration: Option<u64>,
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> std::result::Result<(StatusCode, Json<AccessRequest>), ApiError> {
    let broker = state.broker.clone();
    let request = blocking(move || {
        broker.create_request(&body.secret_uuids, &body.reason, &body.task_ref, body.duration)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn validate_grant(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<bool>, ApiError> {
    let broker = state.broker.clone();
    Ok(Json(blocking(move || broker.validate_grant(&request_id)).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectBody {
    request_id: String,
    env_var_name: Option<String>,
    command: Vec<String>,
}

pub async fn inject(
    State(state): State<AppState>,
    Json(body): Json<InjectBody>,
) -> std::result::Result<Json<InjectionResult>, ApiError> {
    let broker = state.broker.clone();
    let result = blocking(move || {
        broker.inject(&body.request_id, body.env_var_name.as_deref(), &body.command)
    })
    .await?;
    Ok(Json(result))
}

/// Unknown routes get the fixed JSON envelope.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found", "statusCode": 404 })),
    )
        .into_response()
}
