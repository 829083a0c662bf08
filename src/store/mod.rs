//! Remote state store: two named text records with versioned,
//! compare-and-swap writes.
//!
//! The store is the only durable state the pipeline has. It offers no
//! transactions; correctness comes from every write carrying the version
//! token observed by the same invocation's read. A stale token is a
//! [`WriteOutcome::Conflict`], which is contention, never an error.

use async_trait::async_trait;
use thiserror::Error;

pub mod github;
pub mod memory;

pub use github::GitHubStateStore;
pub use memory::InMemoryStateStore;

/// A record value paired with its opaque version token.
///
/// An absent record (never written) has neither value nor version and is
/// treated by callers as value 0 / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedRecord {
    pub value: Option<String>,
    pub version: Option<String>,
}

impl VersionedRecord {
    /// Parse the record as a non-negative id, treating absence and blank
    /// content as 0.
    pub fn as_id(&self) -> Result<u64, StoreError> {
        match &self.value {
            None => Ok(0),
            Some(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(0)
                } else {
                    trimmed.parse().map_err(|_| StoreError::Decode {
                        detail: format!("record is not a numeric id: {trimmed:?}"),
                    })
                }
            }
        }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was accepted; carries the new version token.
    Written { version: String },
    /// The supplied version token was stale; a concurrent writer won.
    Conflict,
}

impl WriteOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }

    /// The new version token, if the write was accepted.
    pub fn version(&self) -> Option<&str> {
        match self {
            WriteOutcome::Written { version } => Some(version),
            WriteOutcome::Conflict => None,
        }
    }
}

/// Errors from the state store. Conflicts are not errors; they are a
/// [`WriteOutcome`] variant so callers cannot accidentally treat
/// contention as failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store not configured: {detail}")]
    NotConfigured { detail: String },
    #[error("state store transport error: {detail}")]
    Transport { detail: String },
    #[error("state store HTTP {status}: {snippet}")]
    Http { status: u16, snippet: String },
    #[error("state store record decode error: {detail}")]
    Decode { detail: String },
}

/// Versioned key/value store boundary.
///
/// Implementations must honor compare-and-swap semantics: a write with an
/// `expected_version` that no longer matches the stored version must
/// return [`WriteOutcome::Conflict`] without modifying the record. A
/// write with `expected_version: None` asserts the record does not exist
/// yet.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a record. Absence is a normal outcome, not an error.
    async fn read(&self, key: &str) -> Result<VersionedRecord, StoreError>;

    /// Conditionally write a record.
    async fn write(
        &self,
        key: &str,
        value: &str,
        expected_version: Option<&str>,
    ) -> Result<WriteOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_record_is_zero() {
        let record = VersionedRecord::default();
        assert_eq!(record.as_id().unwrap(), 0);
    }

    #[test]
    fn blank_record_is_zero() {
        let record = VersionedRecord {
            value: Some("  \n".to_string()),
            version: Some("abc".to_string()),
        };
        assert_eq!(record.as_id().unwrap(), 0);
    }

    #[test]
    fn numeric_record_parses() {
        let record = VersionedRecord {
            value: Some("15560678\n".to_string()),
            version: Some("abc".to_string()),
        };
        assert_eq!(record.as_id().unwrap(), 15_560_678);
    }

    #[test]
    fn garbage_record_is_decode_error() {
        let record = VersionedRecord {
            value: Some("not-a-number".to_string()),
            version: None,
        };
        assert!(matches!(record.as_id(), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn write_outcome_accessors() {
        let written = WriteOutcome::Written {
            version: "v1".to_string(),
        };
        assert!(!written.is_conflict());
        assert_eq!(written.version(), Some("v1"));
        assert!(WriteOutcome::Conflict.is_conflict());
        assert_eq!(WriteOutcome::Conflict.version(), None);
    }
}
