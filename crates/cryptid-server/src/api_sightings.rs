//! HTTP handlers for the sighting CRUD surface.
//!
//! Thin orchestration over [`cryptid_store::SightingStore`]: each handler
//! validates at the boundary, runs the blocking store call on the blocking
//! pool, and maps store errors through [`ApiError`]. Create and update
//! return the record the store read back after committing, so responses
//! reflect persisted state rather than the caller's input echoed back.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cryptid_store::{CreateSightingParams, StoreError, UpdateSightingParams};
use cryptid_types::Sighting;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Error response for the sighting API.
#[derive(Debug)]
pub enum ApiError {
    /// One or more required fields are missing. All violations are reported
    /// together.
    Validation(Vec<String>),
    /// The target sighting does not exist.
    NotFound,
    /// A uniqueness constraint was violated.
    Duplicate(String),
    /// The store failed; the body carries the underlying error for
    /// diagnostics.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Duplicate(id) => (
                StatusCode::CONFLICT,
                Json(json!({"error": format!("sighting already exists: {id}")})),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": message})),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::Duplicate(id) => ApiError::Duplicate(id),
            other => {
                tracing::error!(error = %other, "sighting store operation failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

/// Request body for creating a sighting. Required fields are optional here
/// so that the handler can report every missing field in one response
/// instead of failing deserialization on the first.
#[derive(Debug, Deserialize)]
pub struct CreateSightingRequest {
    pub state: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub sighted_at: Option<String>,
}

fn require_field(value: Option<String>, name: &str, errors: &mut Vec<String>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(format!("You must provide a {name}!"));
            None
        }
    }
}

/// Runs a blocking store call on the blocking pool, flattening the join
/// error into [`ApiError`].
async fn run_store<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "store task join error");
            ApiError::Internal("internal task failure".to_string())
        })?
        .map_err(ApiError::from)
}

/// POST /sightings
pub async fn create_sighting_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateSightingRequest>,
) -> Result<Json<Sighting>, ApiError> {
    // Required-field check happens before any store call; all missing
    // fields are reported together.
    let mut errors = Vec::new();
    let partition_state = require_field(payload.state, "state", &mut errors);
    let description = require_field(payload.description, "description", &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let params = CreateSightingParams {
        // Both are Some here: require_field only returns None alongside a
        // recorded error, and we returned above if any were recorded.
        state: partition_state.unwrap_or_default(),
        description: description.unwrap_or_default(),
        location: payload.location,
        sighted_at: payload.sighted_at,
    };

    let store = state.store.clone();
    let sighting = run_store(move || store.create(&params)).await?;
    Ok(Json(sighting))
}

/// GET /sightings/:state
pub async fn list_sightings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(partition_state): Path<String>,
) -> Result<Json<Vec<Sighting>>, ApiError> {
    let store = state.store.clone();
    let sightings = run_store(move || store.list_by_state(&partition_state)).await?;
    Ok(Json(sightings))
}

/// GET /sighting/:id
pub async fn get_sighting_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Sighting>, ApiError> {
    let store = state.store.clone();
    let sighting = run_store(move || store.get(&id)).await?;
    Ok(Json(sighting))
}

/// PUT /sighting/:id
///
/// The body is a partial update; an `id` field in the body is ignored —
/// [`UpdateSightingParams`] has no id field, and unknown keys are dropped
/// during deserialization.
pub async fn update_sighting_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(updates): Json<UpdateSightingParams>,
) -> Result<Json<Sighting>, ApiError> {
    let store = state.store.clone();
    let sighting = run_store(move || store.update(&id, &updates)).await?;
    Ok(Json(sighting))
}

/// DELETE /sighting/:id
///
/// Strict semantics: deleting an unknown id is a 404, consistent with get
/// and update.
pub async fn delete_sighting_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.clone();
    let removed = run_store(move || store.delete(&id)).await?;
    Ok(Json(json!({"status": "deleted", "id": removed.id})))
}
