//! Last-good snapshot per data kind.
//!
//! One entry per kind, overwritten in place; there is no eviction and no TTL.
//! Whether an entry is "stale" is decided by the poller from the breaker and
//! fetch outcome, never by the cache.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nasfeed_core::DataKind;
use serde_json::Value;

/// Last successfully fetched payload for one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub kind: DataKind,
    pub payload: Value,
    pub last_updated: DateTime<Utc>,
}

/// Snapshot cache shared by all pollers.
///
/// Each kind's entry is written only by that kind's poller.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: DashMap<DataKind, CacheEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &DataKind) -> Option<CacheEntry> {
        self.entries.get(kind).map(|entry| entry.clone())
    }

    /// Store `payload` for `kind`, stamped with the current time.
    pub fn put(&self, kind: DataKind, payload: Value) {
        self.put_at(kind, payload, Utc::now());
    }

    pub fn put_at(&self, kind: DataKind, payload: Value, last_updated: DateTime<Utc>) {
        self.entries.insert(
            kind.clone(),
            CacheEntry {
                kind,
                payload,
                last_updated,
            },
        );
    }

    /// Age of the entry for `kind` in milliseconds.
    pub fn age_ms(&self, kind: &DataKind) -> Option<i64> {
        self.entries
            .get(kind)
            .map(|entry| (Utc::now() - entry.last_updated).num_milliseconds())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
