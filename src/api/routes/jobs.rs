//! Job handlers: submission, lookup and the per-job event stream.

use super::SubmitResponse;
use crate::api::AppState;
use crate::api::sse::{self, EventStream};
use crate::error::Error;
use crate::types::{DownloadRequest, JobId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
};

/// POST /downloads - Start a download job
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "jobs",
    request_body = crate::types::DownloadRequest,
    responses(
        (status = 202, description = "Job started", body = SubmitResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    match state.manager.submit(request).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(SubmitResponse { job_id })).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "rejected download request");
            e.into_response()
        }
    }
}

/// GET /jobs - Ids of running jobs
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Running job ids, oldest first", body = Vec<JobId>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.list_active().await)
}

/// GET /jobs/:id - Single job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = crate::types::JobInfo),
        (status = 400, description = "Malformed job id", body = crate::error::ApiError),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    match state.manager.get(id).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs/:id/events - Server-sent events stream of one job
///
/// Replays the job's events from the start, then follows it live. The stream
/// closes after the terminal event; for an unknown job it stays silent and
/// closes after the configured idle timeout.
#[utoipa::path(
    get,
    path = "/jobs/{id}/events",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 400, description = "Malformed job id", body = crate::error::ApiError)
    )
)]
pub async fn job_events(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let stream: EventStream = match state.manager.subscribe(id).await {
        Ok(subscription) => sse::job_stream(subscription),
        Err(Error::JobNotFound(_)) => {
            tracing::debug!(job_id = %id, "event stream requested for unknown job");
            sse::idle_stream(state.config.jobs.idle_timeout)
        }
        Err(e) => return e.into_response(),
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.config.jobs.keep_alive))
        .into_response()
}

fn parse_job_id(raw: &str) -> Result<JobId, Error> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("malformed job id: {raw}")))
}
