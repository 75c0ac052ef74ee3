//! REST API server module
//!
//! HTTP binding of the job manager: submit downloads, follow a job's progress
//! as server-sent events and run the version formatter.

use crate::{JobManager, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod sse;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /downloads` - Start a download job (202 with the job id)
/// - `GET /jobs` - Ids of running jobs
/// - `GET /jobs/:id` - Single job
/// - `GET /jobs/:id/events` - Server-sent events stream of one job
///
/// ## Formatter
/// - `POST /format` - Serialize version folders
///
/// ## System
/// - `GET /capabilities` - External tool availability
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(manager: JobManager) -> Router {
    let state = AppState::new(manager);
    let api = &state.config.server.api;

    let router = Router::new()
        // Jobs
        .route("/downloads", post(routes::submit_download))
        .route("/jobs", get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/events", get(routes::job_events))
        // Formatter
        .route("/format", post(routes::format_folders))
        // System
        .route("/capabilities", get(routes::get_capabilities))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    // Swagger UI serves its own copy of the document
    let router = if api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let cors = api.cors_enabled.then(|| build_cors_layer(&api.cors_origins));
    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Serves until the manager is shut down (see
/// [`JobManager::shutdown`]) or the listener fails.
///
/// # Example
///
/// ```no_run
/// use udown::{Config, JobManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = JobManager::new(Config::default()).await?;
///
/// // Start API server (blocks until shutdown)
/// udown::api::start_api_server(manager).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(manager: JobManager) -> Result<()> {
    let bind_address = manager.config().server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let shutdown = manager.clone();
    let app = create_router(manager);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.shutdown_requested().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
