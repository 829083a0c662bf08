//! The ordered pipeline steps.
//!
//! Fixed order: read_state → list_documents → select_next →
//! fetch_document → extract_fields → deliver → finalize. Each step holds
//! the client it needs and communicates only through the shared context.
//! The selector and the finalize gate are the only steps that touch
//! durable state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, DeliveryConfig};
use crate::delivery::{DeliveryClient, DeliveryRequest, HttpDeliveryClient};
use crate::extract;
use crate::finalize::FinalizeGate;
use crate::selector::{self, IdleReason, SelectionFilter};
use crate::source::{DocumentSource, HttpDocumentSource};
use crate::store::{GitHubStateStore, InMemoryStateStore, StateStore};

use super::context::PipelineContext;
use super::runner::{Runner, Step, StepOutcome};

/// Read both durable records into the context, honoring the per-request
/// watermark overrides. The stored values are always read for
/// visibility, but never overwrite an override.
pub struct ReadState {
    store: Arc<dyn StateStore>,
    watermark_key: String,
    lock_key: String,
}

#[async_trait]
impl Step for ReadState {
    fn name(&self) -> &'static str {
        "read_state"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        // start_document_id means "process exactly this id next":
        // effectively a watermark of id - 1 for this invocation
        if let Some(start) = ctx.start_document_id {
            ctx.watermark = Some(start.saturating_sub(1));
        } else if let Some(watermark) = ctx.watermark_override {
            ctx.watermark = Some(watermark);
        }

        let record = match self.store.read(&self.watermark_key).await {
            Ok(record) => record,
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("read_state: {e}"),
                }
            }
        };
        let stored = match record.as_id() {
            Ok(id) => id,
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("read_state: {e}"),
                }
            }
        };
        ctx.stored_watermark = Some(stored);
        ctx.watermark_version = record.version;
        if ctx.watermark.is_none() {
            ctx.watermark = Some(stored);
        }

        let record = match self.store.read(&self.lock_key).await {
            Ok(record) => record,
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("read_state: {e}"),
                }
            }
        };
        match record.as_id() {
            Ok(id) => ctx.lock = Some(id),
            Err(e) => {
                return StepOutcome::Fail {
                    error: format!("read_state: {e}"),
                }
            }
        }
        ctx.lock_version = record.version;

        StepOutcome::Continue
    }
}

/// Fetch the candidate set from the document source.
pub struct ListDocuments {
    source: Arc<dyn DocumentSource>,
}

#[async_trait]
impl Step for ListDocuments {
    fn name(&self) -> &'static str {
        "list_documents"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(watermark) = ctx.watermark else {
            return StepOutcome::Fail {
                error: "list_documents: watermark missing (run read_state first)".to_string(),
            };
        };

        // Filter scans may target documents at or below the watermark,
        // so the barrier drops to zero in scan mode
        let scanning = ctx
            .override_directive
            .as_ref()
            .is_some_and(selector::OverrideDirective::needs_scan);
        let barrier = if scanning { 0 } else { watermark };

        let date_hint = ctx
            .override_directive
            .as_ref()
            .and_then(|d| match d.filter {
                SelectionFilter::DateEqual { date } => Some(date),
                SelectionFilter::DateRange { from, .. } => from,
                _ => None,
            });

        match self.source.list_newer_than(barrier, date_hint).await {
            Ok(ids) => {
                tracing::debug!(invocation = %ctx.invocation_id, count = ids.len(), "candidates listed");
                ctx.candidates = Some(ids);
                StepOutcome::Continue
            }
            Err(e) => StepOutcome::Fail {
                error: format!("list_documents: {e}"),
            },
        }
    }
}

/// Decide the next document and, in state-mutating mode, take the lock
/// with a conditional write.
pub struct SelectNext {
    store: Arc<dyn StateStore>,
    source: Arc<dyn DocumentSource>,
    lock_key: String,
    default_scan_limit: usize,
}

impl SelectNext {
    /// Scan candidates ascending, fetching summaries until the filter
    /// matches or the scan limit is exhausted. Smallest id wins.
    async fn scan(
        &self,
        ctx: &mut PipelineContext,
        filter: &SelectionFilter,
        limit: usize,
    ) -> Result<Option<u64>, StepOutcome> {
        let candidates = ctx.candidates.clone().unwrap_or_default();
        let mut scanned = 0usize;

        for id in candidates.into_iter().take(limit) {
            scanned += 1;
            let summary = match self.source.fetch_summary(id).await {
                Ok(summary) => summary,
                Err(e) => {
                    ctx.scanned = Some(scanned);
                    return Err(StepOutcome::Fail {
                        error: format!("select_next: summary fetch for {id}: {e}"),
                    });
                }
            };
            if selector::matches_summary(filter, &summary) {
                ctx.scanned = Some(scanned);
                return Ok(Some(id));
            }
        }

        ctx.scanned = Some(scanned);
        Ok(None)
    }
}

#[async_trait]
impl Step for SelectNext {
    fn name(&self) -> &'static str {
        "select_next"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(lock) = ctx.lock else {
            return StepOutcome::Fail {
                error: "select_next: lock state missing (run read_state first)".to_string(),
            };
        };

        // A stuck lock is "nothing to do this tick", not a failure
        if lock != 0 {
            tracing::info!(invocation = %ctx.invocation_id, lock, "document already in flight");
            return StepOutcome::Halt {
                reason: IdleReason::Locked,
            };
        }

        let Some(watermark) = ctx.watermark else {
            return StepOutcome::Fail {
                error: "select_next: watermark missing (run read_state first)".to_string(),
            };
        };
        if ctx.candidates.is_none() {
            return StepOutcome::Fail {
                error: "select_next: candidates missing (run list_documents first)".to_string(),
            };
        }

        let selection = match ctx.override_directive.clone() {
            Some(directive) => match &directive.filter {
                SelectionFilter::ExactId { id } => Some(*id),
                filter => {
                    let limit = directive.scan_limit.unwrap_or(self.default_scan_limit);
                    match self.scan(ctx, filter, limit).await {
                        Ok(selection) => selection,
                        Err(fail) => return fail,
                    }
                }
            },
            None => selector::pick_next(watermark, ctx.candidates.as_deref().unwrap_or(&[])),
        };

        let Some(doc_id) = selection else {
            let reason = if ctx.override_directive.is_some() {
                IdleReason::NoMatch
            } else {
                IdleReason::NothingNew
            };
            return StepOutcome::Halt { reason };
        };

        ctx.selection = Some(doc_id);

        if !ctx.mutate_state {
            tracing::debug!(invocation = %ctx.invocation_id, doc_id, "selected (test mode, lock not taken)");
            return StepOutcome::Continue;
        }

        // Take the lock with the version observed by read_state; losing
        // the race means another invocation got here first and we defer
        match self
            .store
            .write(
                &self.lock_key,
                &doc_id.to_string(),
                ctx.lock_version.as_deref(),
            )
            .await
        {
            Ok(outcome) => match outcome.version() {
                Some(version) => {
                    ctx.lock = Some(doc_id);
                    ctx.lock_version = Some(version.to_string());
                    tracing::info!(invocation = %ctx.invocation_id, doc_id, "lock taken");
                    StepOutcome::Continue
                }
                None => {
                    tracing::info!(invocation = %ctx.invocation_id, doc_id, "lost lock race, deferring");
                    ctx.selection = None;
                    StepOutcome::Halt {
                        reason: IdleReason::LockConflict,
                    }
                }
            },
            Err(e) => StepOutcome::Fail {
                error: format!("select_next: lock write failed: {e}"),
            },
        }
    }
}

/// Fetch the full document payload for the selection.
pub struct FetchDocument {
    source: Arc<dyn DocumentSource>,
}

#[async_trait]
impl Step for FetchDocument {
    fn name(&self) -> &'static str {
        "fetch_document"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(doc_id) = ctx.selection else {
            return StepOutcome::Fail {
                error: "fetch_document: no document selected".to_string(),
            };
        };

        match self.source.fetch_full(doc_id).await {
            Ok(xml) => {
                tracing::debug!(invocation = %ctx.invocation_id, doc_id, bytes = xml.len(), "document fetched");
                ctx.raw_document = Some(xml);
                StepOutcome::Continue
            }
            Err(e) => StepOutcome::Fail {
                error: format!("fetch_document: {e}"),
            },
        }
    }
}

/// Flatten the payload's header fields for the delivery call.
pub struct ExtractFields;

#[async_trait]
impl Step for ExtractFields {
    fn name(&self) -> &'static str {
        "extract_fields"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(xml) = &ctx.raw_document else {
            return StepOutcome::Fail {
                error: "extract_fields: no document payload (run fetch_document first)".to_string(),
            };
        };

        match extract::extract_fields(xml) {
            Ok(fields) => {
                ctx.fields = Some(fields);
                StepOutcome::Continue
            }
            Err(e) => StepOutcome::Fail {
                error: format!("extract_fields: {e}"),
            },
        }
    }
}

/// Post the normalized document to the delivery worker.
pub struct Deliver {
    client: Arc<dyn DeliveryClient>,
    config: DeliveryConfig,
}

#[async_trait]
impl Step for Deliver {
    fn name(&self) -> &'static str {
        "deliver"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(doc_id) = ctx.selection else {
            return StepOutcome::Fail {
                error: "deliver: no document selected".to_string(),
            };
        };
        let Some(fields) = ctx.fields.clone() else {
            return StepOutcome::Fail {
                error: "deliver: no extracted fields (run extract_fields first)".to_string(),
            };
        };
        let Some(xml) = ctx.raw_document.clone() else {
            return StepOutcome::Fail {
                error: "deliver: no document payload".to_string(),
            };
        };

        let request = DeliveryRequest::from_fields(doc_id, &fields, xml, &self.config);
        match self.client.deliver(&request).await {
            Ok(outcome) => {
                let status_code = outcome.status_code;
                let ok = outcome.is_http_success();
                // Keep the outcome even on failure; the trace is
                // diagnostic either way
                ctx.delivery = Some(outcome);
                if ok {
                    tracing::info!(invocation = %ctx.invocation_id, doc_id, status_code, "delivered");
                    StepOutcome::Continue
                } else {
                    StepOutcome::Fail {
                        error: format!("deliver: worker HTTP {status_code}"),
                    }
                }
            }
            Err(e) => StepOutcome::Fail {
                error: format!("deliver: {e}"),
            },
        }
    }
}

/// Commit durable state through the finalize gate.
pub struct Finalize {
    gate: FinalizeGate,
}

#[async_trait]
impl Step for Finalize {
    fn name(&self) -> &'static str {
        "finalize"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
        self.gate.commit(ctx).await
    }
}

/// Assemble the runner over explicit client instances. Tests inject
/// fakes here; production wiring goes through [`build_default`].
pub fn build_runner(
    config: &Config,
    store: Arc<dyn StateStore>,
    source: Arc<dyn DocumentSource>,
    delivery: Arc<dyn DeliveryClient>,
) -> Runner {
    let watermark_key = config.store.watermark_path.clone();
    let lock_key = config.store.lock_path.clone();

    Runner::new(vec![
        Box::new(ReadState {
            store: Arc::clone(&store),
            watermark_key: watermark_key.clone(),
            lock_key: lock_key.clone(),
        }),
        Box::new(ListDocuments {
            source: Arc::clone(&source),
        }),
        Box::new(SelectNext {
            store: Arc::clone(&store),
            source: Arc::clone(&source),
            lock_key: lock_key.clone(),
            default_scan_limit: config.selector.scan_limit,
        }),
        Box::new(FetchDocument {
            source: Arc::clone(&source),
        }),
        Box::new(ExtractFields),
        Box::new(Deliver {
            client: Arc::clone(&delivery),
            config: config.delivery.clone(),
        }),
        Box::new(Finalize {
            gate: FinalizeGate::new(store, watermark_key, lock_key),
        }),
    ])
}

/// Production wiring: HTTP clients built from configuration. Fails fast
/// on missing credentials.
pub fn build_default(config: &Config) -> anyhow::Result<Runner> {
    let store: Arc<dyn StateStore> = Arc::new(GitHubStateStore::new(&config.store)?);
    let source: Arc<dyn DocumentSource> = Arc::new(HttpDocumentSource::new(&config.source)?);
    let delivery: Arc<dyn DeliveryClient> = Arc::new(HttpDeliveryClient::new(&config.delivery)?);
    Ok(build_runner(config, store, source, delivery))
}

/// Development wiring: real source and worker clients over an in-memory
/// state store, so local runs never touch the shared state repository.
pub fn build_local_state(config: &Config) -> anyhow::Result<Runner> {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let source: Arc<dyn DocumentSource> = Arc::new(HttpDocumentSource::new(&config.source)?);
    let delivery: Arc<dyn DeliveryClient> = Arc::new(HttpDeliveryClient::new(&config.delivery)?);
    Ok(build_runner(config, store, source, delivery))
}
