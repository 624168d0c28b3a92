// src/ingest/types.rs
use anyhow::Result;

use crate::posting::RawPosting;

/// One job source. A failing provider only loses its own postings for the run.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_postings(&self) -> Result<Vec<RawPosting>>;
    fn name(&self) -> &'static str;
}

/// What the aggregator hands to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    pub postings: Vec<RawPosting>,
    /// Records fetched before URL dedup.
    pub total_raw: usize,
    pub dropped_no_url: usize,
    pub duplicate_urls: usize,
    pub source_errors: usize,
}
