// src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use super::PostingStore;
use crate::error::StoreError;
use crate::posting::{AdmittedPosting, StoredPosting};

/// In-memory store. One mutex over the whole map makes `try_admit` atomic.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, StoredPosting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rows<T>(&self, f: impl FnOnce(&mut HashMap<String, StoredPosting>) -> T) -> T {
        let mut guard = match self.rows.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.with_rows(|rows| rows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn exists(&self, identity: &str) -> Result<bool, StoreError> {
        Ok(self.with_rows(|rows| rows.contains_key(identity)))
    }

    async fn try_admit(
        &self,
        posting: &AdmittedPosting,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredPosting>, StoreError> {
        let stored = StoredPosting::from_admitted(posting, now);
        Ok(self.with_rows(|rows| match rows.entry(stored.identity.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(slot.insert(stored).clone()),
        }))
    }

    async fn mark_delivered(&self, identity: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.with_rows(|rows| match rows.get_mut(identity) {
            Some(row) => {
                row.delivered = true;
                row.delivered_at.get_or_insert(now);
                true
            }
            None => false,
        }))
    }

    async fn recent(
        &self,
        now: DateTime<Utc>,
        days: u32,
        limit: usize,
    ) -> Result<Vec<StoredPosting>, StoreError> {
        let cutoff = now - Duration::days(i64::from(days));
        let mut out: Vec<StoredPosting> = self.with_rows(|rows| {
            rows.values()
                .filter(|p| p.effective_time() >= cutoff)
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| b.effective_time().cmp(&a.effective_time()));
        out.truncate(limit);
        Ok(out)
    }

    async fn get(&self, identity: &str) -> Result<Option<StoredPosting>, StoreError> {
        Ok(self.with_rows(|rows| rows.get(identity).cloned()))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.with_rows(|rows| rows.values().filter(|p| p.first_seen_at >= since).count() as u64))
    }

    async fn undelivered(&self, limit: usize) -> Result<Vec<StoredPosting>, StoreError> {
        let mut out: Vec<StoredPosting> =
            self.with_rows(|rows| rows.values().filter(|p| !p.delivered).cloned().collect());
        out.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn contract_admit_is_exactly_once() {
        contract::admit_is_exactly_once(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn contract_mark_delivered() {
        contract::mark_delivered_is_idempotent(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn contract_recent() {
        contract::recent_orders_and_limits(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn concurrent_admits_insert_once() {
        let store = Arc::new(MemoryStore::new());
        let p = contract::posting(7, None);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                store.try_admit(&p, contract::now()).await.unwrap().is_some()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 1);
    }
}
