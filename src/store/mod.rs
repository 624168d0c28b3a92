// src/store/mod.rs
//! Durable identity/dedup store.
//!
//! Backends:
//! - `MemoryStore` - in-process map (tests, dry runs)
//! - `SqliteStore` - sqlx/SQLite (service)
//!
//! The uniqueness constraint on `identity` is the real dedup guard; `exists` is only a
//! fast path for diagnostics.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::posting::{AdmittedPosting, StoredPosting};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn exists(&self, identity: &str) -> Result<bool, StoreError>;

    /// Atomic check-then-insert. `None` means the identity was already stored and
    /// nothing changed.
    async fn try_admit(
        &self,
        posting: &AdmittedPosting,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredPosting>, StoreError>;

    /// Set `delivered`; `delivered_at` is written only the first time.
    /// Unknown identity → `Ok(false)`.
    async fn mark_delivered(&self, identity: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Up to `limit` postings whose post time (or first sighting) is within `days`,
    /// most recent first.
    async fn recent(
        &self,
        now: DateTime<Utc>,
        days: u32,
        limit: usize,
    ) -> Result<Vec<StoredPosting>, StoreError>;

    async fn get(&self, identity: &str) -> Result<Option<StoredPosting>, StoreError>;

    /// Postings first seen at or after `since`.
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Oldest undelivered postings first.
    async fn undelivered(&self, limit: usize) -> Result<Vec<StoredPosting>, StoreError>;
}

/// Start of the UTC day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now)
}
