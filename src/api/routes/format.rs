//! Version formatter handler.

use super::FormatBody;
use crate::api::AppState;
use crate::error::Error;
use crate::formatter::format_versions;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /format - Serialize version folders into one target folder
///
/// Runs on a blocking thread. Per-file failures are part of the report;
/// only batch-level problems produce an error status.
#[utoipa::path(
    post,
    path = "/format",
    tag = "format",
    request_body = FormatBody,
    responses(
        (status = 200, description = "Formatter report", body = crate::formatter::FormatReport),
        (status = 409, description = "Target holds earlier output", body = crate::error::ApiError),
        (status = 422, description = "Invalid range or no source folders", body = crate::error::ApiError),
        (status = 500, description = "Target cannot be prepared", body = crate::error::ApiError)
    )
)]
pub async fn format_folders(State(state): State<AppState>, Json(body): Json<FormatBody>) -> Response {
    let request = body.into_request(&state.config.formatter);

    let result = tokio::task::spawn_blocking(move || format_versions(&request)).await;
    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "version format failed");
            e.into_response()
        }
        Err(e) => Error::Other(format!("formatter task failed: {e}")).into_response(),
    }
}
