//! Document source boundary: the accounting backend that issues sales
//! documents.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use http::HttpDocumentSource;

/// Lightweight record used during override-scan selection, so filters can
/// be tested without holding whole payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: u64,
    pub document_ref: Option<String>,
    pub comment: Option<String>,
    pub document_date: Option<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("document source not configured: {detail}")]
    NotConfigured { detail: String },
    #[error("document source transport error: {detail}")]
    Transport { detail: String },
    #[error("document source HTTP {status}: {snippet}")]
    Http { status: u16, snippet: String },
    #[error("document source payload parse error: {detail}")]
    Parse { detail: String },
}

/// Read-only client for listing and fetching sales documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Candidate document ids strictly greater than `watermark`,
    /// ascending and deduplicated. Stable across repeated calls barring
    /// upstream changes.
    async fn list_newer_than(
        &self,
        watermark: u64,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<u64>, SourceError>;

    /// Full document payload, opaque to the pipeline core.
    async fn fetch_full(&self, id: u64) -> Result<String, SourceError>;

    /// Lightweight record for override filter matching.
    async fn fetch_summary(&self, id: u64) -> Result<DocumentSummary, SourceError>;
}

/// Normalize a raw id listing into a candidate set: ascending, deduped,
/// strictly above the watermark.
pub(crate) fn normalize_candidates(mut ids: Vec<u64>, watermark: u64) -> Vec<u64> {
    ids.sort_unstable();
    ids.dedup();
    ids.retain(|id| *id > watermark);
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_dedupes_and_filters() {
        let ids = vec![105, 101, 103, 101, 99];
        assert_eq!(normalize_candidates(ids, 100), vec![101, 103, 105]);
    }

    #[test]
    fn normalize_empty_when_nothing_newer() {
        assert_eq!(normalize_candidates(vec![5, 7], 100), Vec::<u64>::new());
    }
}
