//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::rest::dto::{
    DebugRunRequest, HealthResponse, RunRequest, RunResponse, TraceEntryDto,
};
use crate::rest::error::ErrorResponse;

/// OpenAPI documentation for the salesbridge trigger API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "salesbridge API",
        description = "Trigger API for the sales document sync pipeline.",
        license(name = "MIT")
    ),
    paths(
        crate::rest::routes::health::health,
        crate::rest::routes::run::run,
        crate::rest::routes::debug::run_step,
        crate::rest::routes::debug::run_until,
    ),
    components(
        schemas(
            HealthResponse,
            RunRequest,
            DebugRunRequest,
            RunResponse,
            TraceEntryDto,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Run", description = "Pipeline trigger"),
        (name = "Debug", description = "Single-step and run-until entry points"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builds_and_lists_paths() {
        let json = ApiDoc::json().unwrap();
        assert!(json.contains("/api/v1/run"));
        assert!(json.contains("/api/v1/run/step"));
        assert!(json.contains("/api/v1/health"));
    }
}
