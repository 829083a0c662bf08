//! Next-document selection logic.
//!
//! Pure decision functions live here so they can be tested without any
//! store or source: normal watermark-based picking, the override filter
//! union, and summary matching for override scans. The lock write that
//! makes a selection stick is performed by the `select_next` pipeline
//! step using these functions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::source::DocumentSummary;

/// Why an invocation ended without work. Benign by definition; never an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleReason {
    /// Another document is already in flight
    Locked,
    /// No candidate above the watermark
    NothingNew,
    /// Override filter scan exhausted without a match
    NoMatch,
    /// Another invocation won the lock race
    LockConflict,
    /// A finalize write lost a version race; deferred to the next run
    StateConflict,
}

impl IdleReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IdleReason::Locked => "locked",
            IdleReason::NothingNew => "nothing_new",
            IdleReason::NoMatch => "no_match",
            IdleReason::LockConflict => "lock_conflict",
            IdleReason::StateConflict => "state_conflict",
        }
    }
}

impl std::fmt::Display for IdleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied selection filter, evaluated in fixed priority order:
/// exact id beats title beats date. Modeled as a union rather than
/// independent flags so the precedence is explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SelectionFilter {
    ExactId { id: u64 },
    Title { substring: String },
    DateEqual { date: NaiveDate },
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

/// Override directive carried by a trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDirective {
    pub filter: SelectionFilter,
    /// Cap on candidates inspected during a filter scan
    pub scan_limit: Option<usize>,
}

impl OverrideDirective {
    /// Build a directive from loose request fields, enforcing precedence.
    /// Returns `None` when no filter field is present.
    pub fn from_parts(
        doc_id: Option<u64>,
        title: Option<&str>,
        date: Option<NaiveDate>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        scan_limit: Option<usize>,
    ) -> Option<Self> {
        let filter = if let Some(id) = doc_id {
            SelectionFilter::ExactId { id }
        } else if let Some(substring) = title.map(str::trim).filter(|t| !t.is_empty()) {
            SelectionFilter::Title {
                substring: substring.to_string(),
            }
        } else if let Some(date) = date {
            SelectionFilter::DateEqual { date }
        } else if date_from.is_some() || date_to.is_some() {
            SelectionFilter::DateRange {
                from: date_from,
                to: date_to,
            }
        } else {
            return None;
        };

        Some(Self { filter, scan_limit })
    }

    /// Whether this directive requires a summary scan (title/date modes)
    pub fn needs_scan(&self) -> bool {
        !matches!(self.filter, SelectionFilter::ExactId { .. })
    }
}

/// Normal-mode pick: smallest candidate strictly greater than the
/// watermark. Candidates are already ascending.
pub fn pick_next(watermark: u64, candidates: &[u64]) -> Option<u64> {
    candidates.iter().copied().find(|id| *id > watermark)
}

/// Test a candidate summary against a scan filter.
///
/// Title: case-insensitive substring against the document reference or
/// the comment, either satisfies. Date: inclusive containment, exact
/// equality for the single-date form.
pub fn matches_summary(filter: &SelectionFilter, summary: &DocumentSummary) -> bool {
    match filter {
        SelectionFilter::ExactId { id } => summary.id == *id,
        SelectionFilter::Title { substring } => {
            let needle = substring.to_lowercase();
            let hit = |field: &Option<String>| {
                field
                    .as_deref()
                    .is_some_and(|f| f.to_lowercase().contains(&needle))
            };
            hit(&summary.document_ref) || hit(&summary.comment)
        }
        SelectionFilter::DateEqual { date } => summary.document_date == Some(*date),
        SelectionFilter::DateRange { from, to } => match summary.document_date {
            Some(d) => from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t),
            None => false,
        },
    }
}
