//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the udown REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the udown REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "udown REST API",
        version = "0.1.0",
        description = "Start playlist downloads, follow their progress as server-sent events and serialize version folders",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_download,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::job_events,

        // Formatter
        crate::api::routes::format_folders,

        // System
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobInfo,
        crate::types::DownloadRequest,
        crate::types::Event,
        crate::types::ErrorKind,

        // Extraction and formatter types
        crate::extractor::ToolCapabilities,
        crate::formatter::FormatReport,
        crate::formatter::FormattedFile,
        crate::formatter::SkippedFile,
        crate::formatter::FileFailure,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::ToolsConfig,
        crate::config::JsRuntimePolicy,
        crate::config::JobConfig,
        crate::config::FormatterConfig,
        crate::config::TransferMode,
        crate::config::ApiConfig,
        crate::config::ServerIntegrationConfig,

        // API request/response types from routes
        crate::api::routes::SubmitResponse,
        crate::api::routes::FormatBody,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Download jobs - Submit, inspect and stream progress events"),
        (name = "format", description = "Version formatter - Merge version folders into one numbered sequence"),
        (name = "system", description = "System endpoints - Health checks, capabilities, OpenAPI spec"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_doc_generation() {
        // Test that the OpenAPI spec can be generated without panicking
        let _spec = ApiDoc::openapi();
    }

    #[test]
    fn test_openapi_spec_has_paths() {
        let spec = ApiDoc::openapi();

        // Verify that the spec has paths defined
        assert!(
            !spec.paths.paths.is_empty(),
            "OpenAPI spec should have paths defined"
        );
    }

    #[test]
    fn test_openapi_spec_has_components() {
        let spec = ApiDoc::openapi();

        // Verify that the spec has components (schemas) defined
        assert!(
            spec.components.is_some(),
            "OpenAPI spec should have components defined"
        );

        let components = spec.components.unwrap();
        assert!(
            !components.schemas.is_empty(),
            "OpenAPI spec should have schemas defined"
        );
    }

    #[test]
    fn test_openapi_spec_has_tags() {
        let spec = ApiDoc::openapi();

        // Verify that tags are defined
        assert!(spec.tags.is_some(), "OpenAPI spec should have tags defined");

        let tags = spec.tags.unwrap();
        assert!(
            !tags.is_empty(),
            "OpenAPI spec should have at least one tag"
        );

        // Check for expected tags
        let tag_names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert!(tag_names.contains(&"jobs"), "Should have 'jobs' tag");
        assert!(tag_names.contains(&"format"), "Should have 'format' tag");
        assert!(tag_names.contains(&"system"), "Should have 'system' tag");
    }

    #[test]
    fn test_openapi_spec_info() {
        let spec = ApiDoc::openapi();

        // Verify basic info
        assert_eq!(spec.info.title, "udown REST API");
        assert_eq!(spec.info.version, "0.1.0");
        assert!(spec.info.description.is_some());
    }

    #[test]
    fn test_openapi_spec_documents_event_stream() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/jobs/{id}/events"));
        assert!(spec.paths.paths.contains_key("/format"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let spec = ApiDoc::openapi();

        // Test that the spec can be serialized to JSON
        let json = serde_json::to_string(&spec).expect("Should serialize to JSON");
        assert!(!json.is_empty(), "JSON output should not be empty");

        // Verify it's valid JSON
        let _value: serde_json::Value =
            serde_json::from_str(&json).expect("Generated JSON should be valid");
    }

    #[test]
    fn test_openapi_spec_version() {
        let spec = ApiDoc::openapi();

        // Verify OpenAPI version by serializing to JSON and checking the version field
        let json = serde_json::to_value(&spec).expect("Should serialize to JSON");
        let version = json.get("openapi").and_then(|v| v.as_str());
        assert!(version.is_some(), "Should have openapi version field");
        assert!(
            version.unwrap().starts_with("3."),
            "Should use OpenAPI 3.x version"
        );
    }
}
