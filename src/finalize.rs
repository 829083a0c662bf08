//! Finalize/ack gate: commits the watermark advance and releases the
//! lock, but only against proof of full downstream completion.
//!
//! The two conditional writes are independent; there is no transaction.
//! If the lock clear loses its version race after the watermark write
//! succeeded, the lock stays held and the next successful run of the
//! same document clears it. That partial-failure window is accepted and
//! visible in the finalize disposition, never hidden.

use std::sync::Arc;

use crate::delivery::DeliveryOutcome;
use crate::pipeline::context::{FinalizeDisposition, PipelineContext};
use crate::pipeline::runner::StepOutcome;
use crate::selector::IdleReason;
use crate::store::StateStore;

/// The only HTTP status accepted as completion; "non-error" is not enough.
const CANONICAL_SUCCESS: u16 = 200;

/// Completion proof predicate. All of: canonical success status code,
/// top-level status tag `created` or `updated`, and a non-empty nested
/// trace with every entry ok.
pub fn completion_proved(outcome: &DeliveryOutcome) -> bool {
    if outcome.status_code != CANONICAL_SUCCESS {
        return false;
    }
    let Some(body) = &outcome.body else {
        return false;
    };

    let status_ok = body
        .status
        .as_deref()
        .map(|s| {
            let s = s.trim().to_lowercase();
            s == "created" || s == "updated"
        })
        .unwrap_or(false);
    if !status_ok {
        return false;
    }

    match &body.trace {
        Some(trace) if !trace.is_empty() => trace.iter().all(|entry| entry.ok == Some(true)),
        _ => false,
    }
}

/// Commits durable state after a proven delivery
pub struct FinalizeGate {
    store: Arc<dyn StateStore>,
    watermark_key: String,
    lock_key: String,
}

impl FinalizeGate {
    pub fn new(store: Arc<dyn StateStore>, watermark_key: String, lock_key: String) -> Self {
        Self {
            store,
            watermark_key,
            lock_key,
        }
    }

    /// Inspect the delivery outcome in the context and, when warranted,
    /// advance the watermark and clear the lock.
    pub async fn commit(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(doc_id) = ctx.selection else {
            return StepOutcome::Fail {
                error: "finalize: no document selected".to_string(),
            };
        };

        if !ctx.mutate_state {
            tracing::info!(invocation = %ctx.invocation_id, doc_id, "finalize skipped (test mode)");
            ctx.finalize = Some(FinalizeDisposition::SkippedTestMode);
            return StepOutcome::Continue;
        }

        let proved = ctx.delivery.as_ref().is_some_and(completion_proved);
        if !proved {
            // A failed delivery must not silently advance the watermark;
            // the lock stays held and blocks selection until a successful
            // re-run of the same document clears it
            return StepOutcome::Fail {
                error: "finalize: downstream completion not proven".to_string(),
            };
        }

        // Idempotence: a second commit of the same outcome is a no-op
        if ctx.lock == Some(0) && ctx.watermark.is_some_and(|w| w >= doc_id) {
            ctx.finalize = Some(FinalizeDisposition::AlreadyFinalized);
            return StepOutcome::Continue;
        }

        // 1) advance the watermark, conditioned on the version observed
        //    by this invocation's state read
        let outcome = match self
            .store
            .write(
                &self.watermark_key,
                &doc_id.to_string(),
                ctx.watermark_version.as_deref(),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("finalize: watermark write failed: {e}"),
                }
            }
        };

        match outcome.version() {
            Some(version) => {
                ctx.watermark_version = Some(version.to_string());
                ctx.watermark = Some(doc_id);
            }
            None => {
                // Another invocation advanced state first; defer
                tracing::warn!(
                    invocation = %ctx.invocation_id,
                    doc_id,
                    "watermark write conflicted, deferring finalize"
                );
                ctx.finalize = Some(FinalizeDisposition::Deferred);
                return StepOutcome::Halt {
                    reason: IdleReason::StateConflict,
                };
            }
        }

        // 2) clear the lock, conditioned on the version returned by the
        //    lock-set write during selection
        let outcome = match self
            .store
            .write(&self.lock_key, "0", ctx.lock_version.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("finalize: lock clear failed: {e}"),
                }
            }
        };

        match outcome.version() {
            Some(version) => {
                ctx.lock_version = Some(version.to_string());
                ctx.lock = Some(0);
                ctx.finalize = Some(FinalizeDisposition::Committed);
                tracing::info!(invocation = %ctx.invocation_id, doc_id, "finalized: watermark advanced, lock cleared");
                StepOutcome::Continue
            }
            None => {
                // Watermark advanced but the lock clear lost its race;
                // the documented partial-failure window
                tracing::warn!(
                    invocation = %ctx.invocation_id,
                    doc_id,
                    "lock clear conflicted after watermark advance"
                );
                ctx.finalize = Some(FinalizeDisposition::Deferred);
                StepOutcome::Halt {
                    reason: IdleReason::StateConflict,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryBody, DeliveryTraceEntry};
    use crate::store::InMemoryStateStore;

    const WATERMARK_KEY: &str = "state/last_processed_id.txt";
    const LOCK_KEY: &str = "state/in_progress_id.txt";

    fn outcome(status_code: u16, status: &str, trace_flags: &[bool]) -> DeliveryOutcome {
        DeliveryOutcome {
            status_code,
            body: Some(DeliveryBody {
                status: Some(status.to_string()),
                trace: Some(
                    trace_flags
                        .iter()
                        .map(|ok| DeliveryTraceEntry {
                            step: None,
                            ok: Some(*ok),
                        })
                        .collect(),
                ),
                ..DeliveryBody::default()
            }),
        }
    }

    #[test]
    fn predicate_requires_all_three_conditions() {
        assert!(completion_proved(&outcome(200, "created", &[true, true])));
        assert!(completion_proved(&outcome(200, " Updated ", &[true])));

        // Wrong code, even a success-ish one
        assert!(!completion_proved(&outcome(201, "created", &[true])));
        // Wrong status tag
        assert!(!completion_proved(&outcome(200, "accepted", &[true])));
        // One false entry poisons the trace
        assert!(!completion_proved(&outcome(200, "created", &[true, false])));
        // Empty trace is no proof
        assert!(!completion_proved(&outcome(200, "created", &[])));
        // Missing body is no proof
        assert!(!completion_proved(&DeliveryOutcome {
            status_code: 200,
            body: None
        }));
    }

    fn gate(store: &Arc<InMemoryStateStore>) -> FinalizeGate {
        FinalizeGate::new(
            Arc::clone(store) as Arc<dyn StateStore>,
            WATERMARK_KEY.to_string(),
            LOCK_KEY.to_string(),
        )
    }

    /// Context as it looks after a successful selection of `doc_id`
    async fn selected_ctx(store: &Arc<InMemoryStateStore>, doc_id: u64) -> PipelineContext {
        let mut ctx = PipelineContext::new();
        let watermark = store.read(WATERMARK_KEY).await.unwrap();
        ctx.watermark = Some(watermark.as_id().unwrap());
        ctx.watermark_version = watermark.version;

        let lock = store.read(LOCK_KEY).await.unwrap();
        let written = store
            .write(LOCK_KEY, &doc_id.to_string(), lock.version.as_deref())
            .await
            .unwrap();
        ctx.lock = Some(doc_id);
        ctx.lock_version = written.version().map(str::to_string);
        ctx.selection = Some(doc_id);
        ctx
    }

    #[tokio::test]
    async fn commit_advances_watermark_and_clears_lock() {
        let store = Arc::new(InMemoryStateStore::new());
        store.seed(WATERMARK_KEY, "100");
        let mut ctx = selected_ctx(&store, 101).await;
        ctx.delivery = Some(outcome(200, "created", &[true, true]));

        let result = gate(&store).commit(&mut ctx).await;
        assert_eq!(result, StepOutcome::Continue);
        assert_eq!(ctx.finalize, Some(FinalizeDisposition::Committed));
        assert_eq!(store.value(WATERMARK_KEY).as_deref(), Some("101"));
        assert_eq!(store.value(LOCK_KEY).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn unproven_delivery_leaves_state_untouched() {
        let store = Arc::new(InMemoryStateStore::new());
        store.seed(WATERMARK_KEY, "100");
        let mut ctx = selected_ctx(&store, 101).await;
        // 200 but one failed sub-step
        ctx.delivery = Some(outcome(200, "created", &[true, false]));

        let result = gate(&store).commit(&mut ctx).await;
        assert!(matches!(result, StepOutcome::Fail { .. }));
        assert_eq!(store.value(WATERMARK_KEY).as_deref(), Some("100"));
        // Lock stays held, blocking further selection
        assert_eq!(store.value(LOCK_KEY).as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_mode_skips_writes() {
        let store = Arc::new(InMemoryStateStore::new());
        store.seed(WATERMARK_KEY, "100");
        let mut ctx = PipelineContext::new_test_mode();
        ctx.selection = Some(101);
        ctx.delivery = Some(outcome(200, "created", &[true]));

        let result = gate(&store).commit(&mut ctx).await;
        assert_eq!(result, StepOutcome::Continue);
        assert_eq!(ctx.finalize, Some(FinalizeDisposition::SkippedTestMode));
        assert_eq!(store.value(WATERMARK_KEY).as_deref(), Some("100"));
        assert!(store.value(LOCK_KEY).is_none());
    }

    #[tokio::test]
    async fn second_commit_is_idempotent() {
        let store = Arc::new(InMemoryStateStore::new());
        store.seed(WATERMARK_KEY, "100");
        let mut ctx = selected_ctx(&store, 101).await;
        ctx.delivery = Some(outcome(200, "updated", &[true]));

        let g = gate(&store);
        assert_eq!(g.commit(&mut ctx).await, StepOutcome::Continue);
        assert_eq!(ctx.finalize, Some(FinalizeDisposition::Committed));

        // Same context, same outcome, second call: no double-advance
        assert_eq!(g.commit(&mut ctx).await, StepOutcome::Continue);
        assert_eq!(ctx.finalize, Some(FinalizeDisposition::AlreadyFinalized));
        assert_eq!(store.value(WATERMARK_KEY).as_deref(), Some("101"));
        assert_eq!(store.value(LOCK_KEY).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn watermark_race_defers_without_error() {
        let store = Arc::new(InMemoryStateStore::new());
        store.seed(WATERMARK_KEY, "100");
        let mut ctx = selected_ctx(&store, 101).await;
        ctx.delivery = Some(outcome(200, "created", &[true]));

        // Concurrent writer bumps the watermark record after our read
        let current = store.read(WATERMARK_KEY).await.unwrap();
        store
            .write(WATERMARK_KEY, "150", current.version.as_deref())
            .await
            .unwrap();

        let result = gate(&store).commit(&mut ctx).await;
        assert_eq!(
            result,
            StepOutcome::Halt {
                reason: IdleReason::StateConflict
            }
        );
        assert_eq!(ctx.finalize, Some(FinalizeDisposition::Deferred));
        assert_eq!(store.value(WATERMARK_KEY).as_deref(), Some("150"));
    }
}
