use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Query};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::SubmissionId;
use crate::domains::submissions::actions::{
    dispatch_next, fetch_submission_status, submit_code, update_submission_status,
    DispatchOutcome,
};
use crate::domains::submissions::{SubmissionError, SubmissionStatus};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct RootResponse {
    message: &'static str,
}

pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello World",
    })
}

// =============================================================================
// POST /submission
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub username: String,
    pub code: String,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSubmissionResponse {
    pub id: SubmissionId,
    /// Only present when the server generated the secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

pub async fn create_submission_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<CreateSubmissionRequest>, JsonRejection>,
) -> Result<Json<CreateSubmissionResponse>, ApiError> {
    let Json(request) = payload?;
    let receipt = submit_code(
        &request.username,
        &request.code,
        request.secret.as_deref(),
        &state.deps,
    )
    .await?;

    Ok(Json(CreateSubmissionResponse {
        id: receipt.id,
        secret: receipt.generated_secret,
    }))
}

// =============================================================================
// GET /new
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub detail: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SubmissionId>,
}

pub async fn dispatch_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let response = match dispatch_next(&state.deps).await? {
        DispatchOutcome::Dispatched { id, .. } => DispatchResponse {
            detail: "ok",
            id: Some(id),
        },
        DispatchOutcome::NoWork => DispatchResponse {
            detail: "no work",
            id: None,
        },
    };
    Ok(Json(response))
}

// =============================================================================
// PATCH /submission
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub id: SubmissionId,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: &'static str,
}

pub async fn update_status_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<DetailResponse>, ApiError> {
    let Json(request) = payload?;
    let status: SubmissionStatus = request
        .status
        .parse()
        .map_err(|e| SubmissionError::validation(format!("{}", e)))?;

    update_submission_status(request.id, status, &state.deps).await?;
    Ok(Json(DetailResponse { detail: "ok" }))
}

// =============================================================================
// GET /submission
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQueryParams {
    pub username: Option<String>,
    pub id: Option<String>,
    #[serde(alias = "password")]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: SubmissionStatus,
}

pub async fn query_status_handler(
    Extension(state): Extension<AppState>,
    params: Result<Query<StatusQueryParams>, QueryRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Query(params) = params?;

    let username = params
        .username
        .ok_or_else(|| SubmissionError::validation("username is required"))?;
    let id: SubmissionId = params
        .id
        .ok_or_else(|| SubmissionError::validation("id is required"))?
        .parse()
        .map_err(|_| SubmissionError::validation("id must be an integer"))?;
    let secret = params
        .secret
        .ok_or_else(|| SubmissionError::validation("secret is required"))?;

    let status = fetch_submission_status(&username, id, &secret, &state.deps).await?;
    Ok(Json(StatusResponse { status }))
}
