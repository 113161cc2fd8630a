//! Administration of subject authorizations.

use crate::api::ApiError;
use crate::AppState;
use axum::extract::{Extension, Json, Path};
use heartwatch_access::{AccessError, AuthorizationRecord};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for `PUT /api/authorizations/{subjectId}`.
#[derive(Debug, Deserialize)]
pub struct UpsertAuthorizationRequest {
    pub origin_country: String,
    #[serde(default)]
    pub access_enabled: Option<bool>,
}

/// Handler for `GET /api/authorizations/{subjectId}`.
pub async fn get_authorization_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<i64>,
) -> Result<Json<AuthorizationRecord>, ApiError> {
    let store = Arc::clone(state.validator.store());
    let record = tokio::task::spawn_blocking(move || store.find(subject_id)).await??;

    record
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no authorization for subject {subject_id}")))
}

/// Handler for `PUT /api/authorizations/{subjectId}`.
///
/// Creates or replaces the record. `access_enabled` defaults to `true`.
pub async fn put_authorization_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<i64>,
    Json(payload): Json<UpsertAuthorizationRequest>,
) -> Result<Json<AuthorizationRecord>, ApiError> {
    if payload.origin_country.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "origin_country must not be empty".to_string(),
        ));
    }

    let store = Arc::clone(state.validator.store());
    let access_enabled = payload.access_enabled.unwrap_or(true);
    let record = tokio::task::spawn_blocking(move || {
        store.upsert(subject_id, &payload.origin_country, access_enabled)
    })
    .await??;

    tracing::info!(
        subject_id,
        origin_country = %record.origin_country,
        access_enabled = record.access_enabled,
        "authorization updated"
    );

    Ok(Json(record))
}

/// Handler for `POST /api/authorizations/{subjectId}/reinstate`.
pub async fn reinstate_authorization_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<i64>,
) -> Result<Json<AuthorizationRecord>, ApiError> {
    let store = Arc::clone(state.validator.store());
    let record = tokio::task::spawn_blocking(move || -> Result<_, AccessError> {
        if store.reinstate(subject_id)? {
            store.find(subject_id)
        } else {
            Ok(None)
        }
    })
    .await??;

    let record = record
        .ok_or_else(|| ApiError::NotFound(format!("no authorization for subject {subject_id}")))?;

    tracing::info!(subject_id, "access reinstated");
    Ok(Json(record))
}
