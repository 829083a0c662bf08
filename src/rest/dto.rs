//! Data Transfer Objects for the trigger API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pipeline::{PipelineContext, RunStatus, TraceEntry};
use crate::selector::OverrideDirective;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Trigger request: all fields optional. A bare POST runs the default,
/// state-mutating "next document" pass. Any override field switches the
/// invocation to safe/test mode unless `update_state: true` is explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RunRequest {
    /// Process exactly this document id (fastest override)
    #[serde(default)]
    pub doc_id: Option<u64>,
    /// Case-insensitive substring matched against document reference or comment
    #[serde(default)]
    pub doc_title: Option<String>,
    /// Exact document date (YYYY-MM-DD)
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Inclusive lower bound of a document date range
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound of a document date range
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    /// Cap on candidates inspected during a filter scan
    #[serde(default)]
    pub scan_limit: Option<usize>,
    /// Explicitly allow (or forbid) durable state mutation
    #[serde(default)]
    pub update_state: Option<bool>,
    /// Start processing from exactly this document id
    #[serde(default)]
    pub start_document_id: Option<u64>,
    /// Watermark override for this invocation only
    #[serde(default)]
    pub last_processed_id: Option<u64>,
}

impl RunRequest {
    fn has_override(&self) -> bool {
        self.doc_id.is_some()
            || self
                .doc_title
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
            || self.date.is_some()
            || self.date_from.is_some()
            || self.date_to.is_some()
            || self.start_document_id.is_some()
            || self.last_processed_id.is_some()
    }

    /// Build the pipeline context this request describes.
    pub fn into_context(self) -> PipelineContext {
        // Overrides default to safe mode; mutation must be explicit
        let mutate_state = self.update_state.unwrap_or(!self.has_override());

        let mut ctx = if mutate_state {
            PipelineContext::new()
        } else {
            PipelineContext::new_test_mode()
        };

        ctx.override_directive = OverrideDirective::from_parts(
            self.doc_id,
            self.doc_title.as_deref(),
            self.date,
            self.date_from,
            self.date_to,
            self.scan_limit,
        );
        ctx.start_document_id = self.start_document_id;
        ctx.watermark_override = self.last_processed_id;
        ctx
    }
}

/// Debug request for the single-step and run-until entry points
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DebugRunRequest {
    /// Step name to run (or to stop after)
    pub step: String,
    /// Same override fields as a normal run
    #[serde(default)]
    pub overrides: RunRequest,
    /// Context seeds for running steps in isolation
    #[serde(default)]
    pub watermark: Option<u64>,
    #[serde(default)]
    pub lock: Option<u64>,
    #[serde(default)]
    pub candidates: Option<Vec<u64>>,
    #[serde(default)]
    pub selection: Option<u64>,
    #[serde(default)]
    pub raw_document: Option<String>,
}

impl DebugRunRequest {
    /// Build a seeded context. Debug runs never mutate state unless
    /// explicitly requested.
    pub fn into_context(self) -> PipelineContext {
        let mut overrides = self.overrides;
        overrides.update_state = Some(overrides.update_state.unwrap_or(false));
        let mut ctx = overrides.into_context();

        if self.watermark.is_some() {
            ctx.watermark = self.watermark;
        }
        if self.lock.is_some() {
            ctx.lock = self.lock;
        }
        if self.candidates.is_some() {
            ctx.candidates = self.candidates;
        }
        if self.selection.is_some() {
            ctx.selection = self.selection;
        }
        if self.raw_document.is_some() {
            ctx.raw_document = self.raw_document;
        }
        ctx
    }
}

/// One step trace entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TraceEntryDto {
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TraceEntry> for TraceEntryDto {
    fn from(entry: &TraceEntry) -> Self {
        Self {
            step: entry.step.clone(),
            ok: entry.ok,
            error: entry.error.clone(),
        }
    }
}

/// Response envelope shared by every entry point
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunResponse {
    /// Terminal status: "ok" or "error"
    pub status: String,
    pub invocation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Idle reason when the pipeline halted benignly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,
    pub trace: Vec<TraceEntryDto>,
}

impl From<&PipelineContext> for RunResponse {
    fn from(ctx: &PipelineContext) -> Self {
        let status = match ctx.status {
            RunStatus::Error => "error",
            RunStatus::Ok | RunStatus::Pending => "ok",
        };

        Self {
            status: status.to_string(),
            invocation_id: ctx.invocation_id,
            error: ctx.error.clone(),
            reason: ctx.halt_reason.map(|r| r.as_str().to_string()),
            document_id: ctx.selection,
            watermark: ctx.watermark,
            finalize: ctx.finalize.map(|f| {
                use crate::pipeline::FinalizeDisposition as F;
                match f {
                    F::SkippedTestMode => "skipped_test_mode",
                    F::AlreadyFinalized => "already_finalized",
                    F::Committed => "committed",
                    F::Deferred => "deferred",
                }
                .to_string()
            }),
            trace: ctx.trace.iter().map(TraceEntryDto::from).collect(),
        }
    }
}
