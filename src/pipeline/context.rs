//! Shared mutable context threaded through every pipeline step.
//!
//! The context is the only inter-step channel: each step reads the
//! fields earlier steps wrote and annotates its own. Every field beyond
//! the trace and terminal status is optional; a debug entry point can
//! seed any subset and run a single step in isolation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::DeliveryOutcome;
use crate::extract::DocumentFields;
use crate::selector::{IdleReason, OverrideDirective};

/// Terminal status of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Ok,
    Error,
}

/// One entry of the per-step trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the finalize gate did with durable state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeDisposition {
    /// Test mode; no writes attempted
    SkippedTestMode,
    /// Lock already clear and watermark already at or past the document
    AlreadyFinalized,
    /// Watermark advanced and lock cleared
    Committed,
    /// A conditional write lost a version race; left for the next run
    Deferred,
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub invocation_id: Uuid,
    /// Name of the step currently executing
    pub current_step: Option<&'static str>,

    // ── request-supplied directives ──────────────────────────────────
    /// Whether durable state may be mutated this invocation
    pub mutate_state: bool,
    pub override_directive: Option<OverrideDirective>,
    /// Start processing from exactly this document id
    pub start_document_id: Option<u64>,
    /// Explicit watermark override for this invocation
    pub watermark_override: Option<u64>,

    // ── read-state ───────────────────────────────────────────────────
    /// Effective watermark for this invocation (override-aware)
    pub watermark: Option<u64>,
    /// Watermark as actually stored, for visibility when overridden
    pub stored_watermark: Option<u64>,
    pub watermark_version: Option<String>,
    pub lock: Option<u64>,
    pub lock_version: Option<String>,

    // ── selection ────────────────────────────────────────────────────
    pub candidates: Option<Vec<u64>>,
    pub selection: Option<u64>,
    /// Candidates inspected during an override scan
    pub scanned: Option<usize>,

    // ── document ─────────────────────────────────────────────────────
    pub raw_document: Option<String>,
    pub fields: Option<DocumentFields>,

    // ── downstream ───────────────────────────────────────────────────
    pub delivery: Option<DeliveryOutcome>,
    pub finalize: Option<FinalizeDisposition>,

    // ── terminal state (owned by the runner) ─────────────────────────
    pub trace: Vec<TraceEntry>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub halt_reason: Option<IdleReason>,
}

impl PipelineContext {
    /// Fresh context for a default, state-mutating invocation.
    pub fn new() -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            current_step: None,
            mutate_state: true,
            override_directive: None,
            start_document_id: None,
            watermark_override: None,
            watermark: None,
            stored_watermark: None,
            watermark_version: None,
            lock: None,
            lock_version: None,
            candidates: None,
            selection: None,
            scanned: None,
            raw_document: None,
            fields: None,
            delivery: None,
            finalize: None,
            trace: Vec::new(),
            status: RunStatus::Pending,
            error: None,
            halt_reason: None,
        }
    }

    /// Fresh context in safe mode (no durable state mutation).
    pub fn new_test_mode() -> Self {
        Self {
            mutate_state: false,
            ..Self::new()
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}
