use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::api::types::{
    ErrorResponse, JobListItem, ListResponse, OutputResponse, StartRequest, StartResponse,
    StatusResponse, StopResponse,
};
use crate::api::ApiState;
use crate::auth::Identity;
use crate::error::JobError;

/// A call error rendered as `{"error": ...}` with the matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = match err {
            JobError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

pub async fn start_job(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let Json(request) = payload?;
    let id = state
        .manager
        .start(&identity, request.program, request.args)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(StartResponse { id: id.to_string() }),
    ))
}

pub async fn stop_job(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    state.manager.stop(&identity, &id).await?;
    Ok(Json(StopResponse { id }))
}

pub async fn get_status(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.manager.get_status(&identity, &id).await?;
    Ok(Json(StatusResponse::new(id, status)))
}

pub async fn get_output(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<OutputResponse>, ApiError> {
    let output = state.manager.get_output(&identity, &id).await?;
    Ok(Json(OutputResponse::new(id, output)))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
) -> Json<ListResponse> {
    let jobs = state
        .manager
        .list(&identity)
        .await
        .into_iter()
        .map(JobListItem::from)
        .collect();
    Json(ListResponse { jobs })
}

pub async fn health() -> &'static str {
    "ok"
}
