//! Trigger endpoint: one POST runs one full pipeline invocation.

use axum::{extract::State, Json};

use crate::rest::dto::{RunRequest, RunResponse};
use crate::rest::state::ApiState;

/// Run the sync pipeline once
///
/// Without a body this processes the next unprocessed document and
/// advances durable state. Override fields (exact id, title substring,
/// date or date range) switch the invocation to safe/test mode unless
/// `update_state: true` is explicit.
#[utoipa::path(
    post,
    path = "/api/v1/run",
    tag = "Run",
    request_body(content = RunRequest, description = "Optional override directives"),
    responses(
        (status = 200, description = "Invocation completed (status field carries ok/error)", body = RunResponse)
    )
)]
pub async fn run(
    State(state): State<ApiState>,
    body: Option<Json<RunRequest>>,
) -> Json<RunResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mut ctx = request.into_context();

    tracing::info!(
        invocation = %ctx.invocation_id,
        mutate_state = ctx.mutate_state,
        has_override = ctx.override_directive.is_some(),
        "run triggered"
    );

    state.runner.run_all(&mut ctx).await;
    Json(RunResponse::from(&ctx))
}
