//! In-memory state store for tests and local development.
//!
//! Versions are a process-wide counter rendered as strings, so the
//! compare-and-swap behavior matches the remote backend: a write must
//! present the version produced by the read (or write) it is based on.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{StateStore, StoreError, VersionedRecord, WriteOutcome};

#[derive(Default)]
pub struct InMemoryStateStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, (String, u64)>,
    next_version: u64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, returning its version token (test convenience).
    pub fn seed(&self, key: &str, value: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_version += 1;
        let version = inner.next_version;
        inner
            .records
            .insert(key.to_string(), (value.to_string(), version));
        version.to_string()
    }

    /// Current value of a record, if any (test convenience).
    pub fn value(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.records.get(key).map(|(v, _)| v.clone())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn read(&self, key: &str) -> Result<VersionedRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(match inner.records.get(key) {
            Some((value, version)) => VersionedRecord {
                value: Some(value.clone()),
                version: Some(version.to_string()),
            },
            None => VersionedRecord::default(),
        })
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
        expected_version: Option<&str>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let current = inner.records.get(key).map(|(_, v)| v.to_string());
        if current.as_deref() != expected_version {
            return Ok(WriteOutcome::Conflict);
        }

        inner.next_version += 1;
        let version = inner.next_version;
        inner
            .records
            .insert(key.to_string(), (value.to_string(), version));
        Ok(WriteOutcome::Written {
            version: version.to_string(),
        })
    }
}
