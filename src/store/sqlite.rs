// src/store/sqlite.rs
//! SQLite backend. Timestamps are stored as fixed-width RFC 3339 UTC text so string
//! comparison in SQL matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::info;

use super::PostingStore;
use crate::error::StoreError;
use crate::posting::{AdmittedPosting, StoredPosting};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if missing.
    ///
    /// - `sqlite::memory:` - ephemeral (tests)
    /// - `sqlite://jobs.db?mode=rwc` - file, created if absent
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        // Every pooled connection to :memory: would open its own empty database.
        let opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = opts.connect(database_url).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(target: "store", in_memory, "sqlite store ready");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS postings (
                identity TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL,
                posted_at TEXT,
                first_seen_at TEXT NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0,
                delivered_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_postings_first_seen ON postings(first_seen_at);
            CREATE INDEX IF NOT EXISTS idx_postings_delivered ON postings(delivered);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, FromRow)]
struct PostingRow {
    identity: String,
    title: String,
    company: String,
    location: String,
    url: String,
    description: String,
    source: String,
    posted_at: Option<String>,
    first_seen_at: String,
    delivered: i64,
    delivered_at: Option<String>,
}

impl PostingRow {
    fn into_stored(self) -> Result<StoredPosting, StoreError> {
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| StoreError::Corrupt {
                    identity: self.identity.clone(),
                    message: format!("invalid timestamp {raw:?}: {e}"),
                })
        };
        let posted_at = self.posted_at.as_deref().map(parse).transpose()?;
        let first_seen_at = parse(&self.first_seen_at)?;
        let delivered_at = self.delivered_at.as_deref().map(parse).transpose()?;

        Ok(StoredPosting {
            identity: self.identity,
            title: self.title,
            company: self.company,
            location: self.location,
            url: self.url,
            description: self.description,
            source: self.source,
            posted_at,
            first_seen_at,
            delivered: self.delivered != 0,
            delivered_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT identity, title, company, location, url, description, source, \
     posted_at, first_seen_at, delivered, delivered_at FROM postings";

fn collect_rows(rows: Vec<PostingRow>) -> Result<Vec<StoredPosting>, StoreError> {
    rows.into_iter().map(PostingRow::into_stored).collect()
}

#[async_trait]
impl PostingStore for SqliteStore {
    async fn exists(&self, identity: &str) -> Result<bool, StoreError> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM postings WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn try_admit(
        &self,
        posting: &AdmittedPosting,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredPosting>, StoreError> {
        let stored = StoredPosting::from_admitted(posting, now);
        let result = sqlx::query(
            r#"
            INSERT INTO postings
                (identity, title, company, location, url, description, source,
                 posted_at, first_seen_at, delivered, delivered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&stored.identity)
        .bind(&stored.title)
        .bind(&stored.company)
        .bind(&stored.location)
        .bind(&stored.url)
        .bind(&stored.description)
        .bind(&stored.source)
        .bind(stored.posted_at.map(ts))
        .bind(ts(stored.first_seen_at))
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() == 1).then_some(stored))
    }

    async fn mark_delivered(&self, identity: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE postings SET delivered = 1, delivered_at = COALESCE(delivered_at, ?) \
             WHERE identity = ?",
        )
        .bind(ts(now))
        .bind(identity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent(
        &self,
        now: DateTime<Utc>,
        days: u32,
        limit: usize,
    ) -> Result<Vec<StoredPosting>, StoreError> {
        let cutoff = now - Duration::days(i64::from(days));
        let sql = format!(
            "{SELECT_COLUMNS} WHERE COALESCE(posted_at, first_seen_at) >= ? \
             ORDER BY COALESCE(posted_at, first_seen_at) DESC LIMIT ?"
        );
        let rows: Vec<PostingRow> = sqlx::query_as(&sql)
            .bind(ts(cutoff))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows)
    }

    async fn get(&self, identity: &str) -> Result<Option<StoredPosting>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE identity = ?");
        let row: Option<PostingRow> = sqlx::query_as(&sql)
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PostingRow::into_stored).transpose()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM postings WHERE first_seen_at >= ?")
            .bind(ts(since))
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn undelivered(&self, limit: usize) -> Result<Vec<StoredPosting>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE delivered = 0 ORDER BY first_seen_at ASC LIMIT ?");
        let rows: Vec<PostingRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn contract_admit_is_exactly_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        contract::admit_is_exactly_once(&store).await;
    }

    #[tokio::test]
    async fn contract_mark_delivered() {
        let store = SqliteStore::in_memory().await.unwrap();
        contract::mark_delivered_is_idempotent(&store).await;
    }

    #[tokio::test]
    async fn contract_recent() {
        let store = SqliteStore::in_memory().await.unwrap();
        contract::recent_orders_and_limits(&store).await;
    }

    #[tokio::test]
    async fn corrupt_timestamp_surfaces_as_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO postings (identity, title, company, url, source, first_seen_at) \
             VALUES ('bad', 't', 'c', 'u', 's', 'yesterday')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
