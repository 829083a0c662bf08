//! Debug entry points: run a single step in isolation, or run the
//! ordered sequence up to a named step.
//!
//! Both reuse the exact step implementations of the normal run; they
//! only change where the sequencer stops. Debug runs default to safe
//! mode.

use axum::{extract::State, Json};

use crate::pipeline::RunnerError;
use crate::rest::dto::{DebugRunRequest, RunResponse};
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;

/// Run a single named step against a seeded context
#[utoipa::path(
    post,
    path = "/api/v1/run/step",
    tag = "Debug",
    request_body = DebugRunRequest,
    responses(
        (status = 200, description = "Step executed", body = RunResponse),
        (status = 404, description = "Unknown step name")
    )
)]
pub async fn run_step(
    State(state): State<ApiState>,
    Json(request): Json<DebugRunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let step = request.step.clone();
    let mut ctx = request.into_context();

    tracing::info!(invocation = %ctx.invocation_id, step, "debug: single step");

    match state.runner.run_only(&step, &mut ctx).await {
        Ok(()) => Ok(Json(RunResponse::from(&ctx))),
        Err(RunnerError::UnknownStep { name }) => {
            Err(ApiError::NotFound(format!("Step '{name}' not found")))
        }
    }
}

/// Run the pipeline in order, stopping after the named step
#[utoipa::path(
    post,
    path = "/api/v1/run/until",
    tag = "Debug",
    request_body = DebugRunRequest,
    responses(
        (status = 200, description = "Prefix executed", body = RunResponse),
        (status = 404, description = "Unknown step name")
    )
)]
pub async fn run_until(
    State(state): State<ApiState>,
    Json(request): Json<DebugRunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let step = request.step.clone();
    let mut ctx = request.into_context();

    tracing::info!(invocation = %ctx.invocation_id, until = step, "debug: run until");

    match state.runner.run_until(&step, &mut ctx).await {
        Ok(()) => Ok(Json(RunResponse::from(&ctx))),
        Err(RunnerError::UnknownStep { name }) => {
            Err(ApiError::NotFound(format!("Step '{name}' not found")))
        }
    }
}
