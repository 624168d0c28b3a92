// src/pipeline.rs
//! One run: aggregate → relevance → freshness → dedup/persist → deliver → mark delivered.
//! Runs are serialized by an in-process lock; the store's atomic insert is the second
//! line of defence across processes.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::freshness::{select_recent, FreshnessReport, FreshnessWindow};
use crate::ingest::Aggregator;
use crate::notify::Notifier;
use crate::posting::{AdmittedPosting, StoredPosting};
use crate::relevance::FilterHandle;
use crate::store::{start_of_day, PostingStore};

pub const DEFAULT_FALLBACK_DAYS: u32 = 3;
pub const DEFAULT_FALLBACK_LIMIT: usize = 10;
pub const PREVIEW_LIMIT: usize = 20;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed runs by outcome.");
        describe_counter!("pipeline_new_postings_total", "Postings admitted to the store.");
        describe_counter!("pipeline_duplicates_total", "Postings already in the store.");
        describe_counter!("store_errors_total", "Per-posting store failures.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the last run finished.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub window: FreshnessWindow,
    pub fallback_days: u32,
    pub fallback_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window: FreshnessWindow::default(),
            fallback_days: DEFAULT_FALLBACK_DAYS,
            fallback_limit: DEFAULT_FALLBACK_LIMIT,
        }
    }
}

impl PipelineSettings {
    pub fn with_window(mut self, window: FreshnessWindow) -> Self {
        self.window = window;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total_found: usize,
    pub passed_filters: usize,
    pub fresh: usize,
    pub newly_admitted: usize,
    pub duplicates: usize,
    pub source_errors: usize,
    pub store_errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    NewPostings,
    Fallback,
    NoneFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Delivered { count: usize },
    DeliveredFallback { count: usize },
    NoneFound,
    DeliveryFailed { stage: DeliveryStage, error: String },
    Aborted { error: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Delivered { .. } | Self::DeliveredFallback { .. } | Self::NoneFound
        )
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::DeliveredFallback { .. } => "delivered_fallback",
            Self::NoneFound => "none_found",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub counts: RunCounts,
    pub freshness: FreshnessReport,
    pub outcome: RunOutcome,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub counts: RunCounts,
    pub new_postings: Vec<AdmittedPosting>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub total_found: usize,
    pub passed_filters: usize,
    pub fresh: usize,
    pub source_errors: usize,
    pub postings: Vec<AdmittedPosting>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub date: String,
    pub today_postings: u64,
}

/// Aggregated + filtered + fresh postings, before touching the store.
struct Gathered {
    counts: RunCounts,
    freshness: FreshnessReport,
    fresh: Vec<AdmittedPosting>,
}

pub struct JobPipeline {
    aggregator: Aggregator,
    filter: FilterHandle,
    store: Arc<dyn PostingStore>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    run_lock: Mutex<()>,
}

impl JobPipeline {
    pub fn new(
        aggregator: Aggregator,
        filter: FilterHandle,
        store: Arc<dyn PostingStore>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            aggregator,
            filter,
            store,
            notifier,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn notifier_name(&self) -> &'static str {
        self.notifier.name()
    }

    async fn gather(&self, now: DateTime<Utc>) -> Gathered {
        let aggregated = self.aggregator.collect().await;
        let total_found = aggregated.postings.len();

        // Snapshot: a hot reload mid-run does not affect this run.
        let filter = self.filter.current();
        let relevant = filter.filter(aggregated.postings);
        let passed_filters = relevant.len();

        let (fresh, freshness) = select_recent(relevant, self.settings.window, now);

        Gathered {
            counts: RunCounts {
                total_found,
                passed_filters,
                fresh: fresh.len(),
                source_errors: aggregated.source_errors,
                ..RunCounts::default()
            },
            freshness,
            fresh,
        }
    }

    /// Admit each posting; per-posting store failures are logged and counted only.
    async fn persist(
        &self,
        postings: Vec<AdmittedPosting>,
        counts: &mut RunCounts,
        now: DateTime<Utc>,
    ) -> Vec<AdmittedPosting> {
        let mut new = Vec::new();
        for p in postings {
            match self.store.try_admit(&p, now).await {
                Ok(Some(_)) => new.push(p),
                Ok(None) => counts.duplicates += 1,
                Err(e) => {
                    counts.store_errors += 1;
                    counter!("store_errors_total").increment(1);
                    warn!(target: "store", error = %e, url = %p.url, "failed to store posting");
                }
            }
        }
        counts.newly_admitted = new.len();
        counter!("pipeline_new_postings_total").increment(new.len() as u64);
        counter!("pipeline_duplicates_total").increment(counts.duplicates as u64);
        info!(
            target: "pipeline",
            new = new.len(),
            duplicates = counts.duplicates,
            store_errors = counts.store_errors,
            "postings persisted"
        );
        new
    }

    async fn mark_all_delivered(&self, identities: &[String], now: DateTime<Utc>) {
        for id in identities {
            match self.store.mark_delivered(id, now).await {
                Ok(true) => {}
                Ok(false) => warn!(target: "store", identity = %id, "mark_delivered: unknown identity"),
                Err(e) => {
                    counter!("store_errors_total").increment(1);
                    warn!(target: "store", error = %e, identity = %id, "mark_delivered failed");
                }
            }
        }
    }

    fn failed(stage: DeliveryStage, e: DeliveryError) -> RunOutcome {
        error!(target: "pipeline", ?stage, error = %e, "delivery failed");
        RunOutcome::DeliveryFailed {
            stage,
            error: e.to_string(),
        }
    }

    /// Full run using the wall clock.
    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// Full run evaluated at `now` (freshness, first-seen and delivery timestamps).
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        ensure_metrics_described();
        let _guard = self.run_lock.lock().await;
        let started_at = Utc::now();
        info!(target: "pipeline", notifier = self.notifier.name(), "run started");

        let Gathered {
            mut counts,
            freshness,
            fresh,
        } = self.gather(now).await;
        let new = self.persist(fresh, &mut counts, now).await;

        let outcome = if !new.is_empty() {
            match self.notifier.deliver(&new).await {
                Ok(()) => {
                    let delivered: Vec<String> = new.iter().map(|p| p.identity()).collect();
                    self.mark_all_delivered(&delivered, now).await;
                    RunOutcome::Delivered { count: new.len() }
                }
                Err(e) => Self::failed(DeliveryStage::NewPostings, e),
            }
        } else {
            self.deliver_fallback(now).await
        };

        let finished_at = Utc::now();
        let success = outcome.is_success();
        counter!("pipeline_runs_total", "outcome" => outcome.label()).increment(1);
        gauge!("pipeline_last_run_ts").set(finished_at.timestamp() as f64);
        info!(
            target: "pipeline",
            outcome = outcome.label(),
            total_found = counts.total_found,
            passed_filters = counts.passed_filters,
            fresh = counts.fresh,
            new = counts.newly_admitted,
            duplicates = counts.duplicates,
            source_errors = counts.source_errors,
            "run finished"
        );

        RunReport {
            counts,
            freshness,
            outcome,
            success,
            started_at,
            finished_at,
        }
    }

    /// Nothing new: resurface recent stored postings, else say nothing was found.
    async fn deliver_fallback(&self, now: DateTime<Utc>) -> RunOutcome {
        let recent: Vec<StoredPosting> = match self
            .store
            .recent(now, self.settings.fallback_days, self.settings.fallback_limit)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                error!(target: "pipeline", error = %e, "loading recent postings failed");
                return RunOutcome::Aborted {
                    error: e.to_string(),
                };
            }
        };

        if recent.is_empty() {
            info!(target: "pipeline", "no new or recent postings");
            return match self.notifier.notify_none_found().await {
                Ok(()) => RunOutcome::NoneFound,
                Err(e) => Self::failed(DeliveryStage::NoneFound, e),
            };
        }

        info!(
            target: "pipeline",
            count = recent.len(),
            days = self.settings.fallback_days,
            "no new postings; sending recent ones"
        );
        let batch: Vec<AdmittedPosting> = recent.iter().map(StoredPosting::to_admitted).collect();
        match self.notifier.deliver(&batch).await {
            Ok(()) => {
                let delivered: Vec<String> = recent.into_iter().map(|p| p.identity).collect();
                self.mark_all_delivered(&delivered, now).await;
                RunOutcome::DeliveredFallback { count: batch.len() }
            }
            Err(e) => Self::failed(DeliveryStage::Fallback, e),
        }
    }

    /// Gather and persist without delivering.
    pub async fn search_and_store(&self) -> SearchReport {
        self.search_and_store_at(Utc::now()).await
    }

    pub async fn search_and_store_at(&self, now: DateTime<Utc>) -> SearchReport {
        let _guard = self.run_lock.lock().await;
        let Gathered {
            mut counts, fresh, ..
        } = self.gather(now).await;
        let new_postings = self.persist(fresh, &mut counts, now).await;
        SearchReport {
            counts,
            new_postings,
        }
    }

    /// Gather only; nothing is stored or sent.
    pub async fn preview(&self, limit: usize) -> PreviewReport {
        self.preview_at(Utc::now(), limit).await
    }

    pub async fn preview_at(&self, now: DateTime<Utc>, limit: usize) -> PreviewReport {
        let Gathered { counts, mut fresh, .. } = self.gather(now).await;
        fresh.truncate(limit);
        PreviewReport {
            total_found: counts.total_found,
            passed_filters: counts.passed_filters,
            fresh: counts.fresh,
            source_errors: counts.source_errors,
            postings: fresh,
        }
    }

    pub async fn stats(&self) -> Result<StatsReport, crate::error::StoreError> {
        let now = Utc::now();
        let today_postings = self.store.count_since(start_of_day(now)).await?;
        Ok(StatsReport {
            date: now.format("%Y-%m-%d").to_string(),
            today_postings,
        })
    }

    pub async fn send_test_message(&self, text: &str) -> Result<(), DeliveryError> {
        self.notifier.notify_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterProfile;
    use crate::ingest::types::SourceProvider;
    use crate::notify::{Captured, CapturingNotifier};
    use crate::posting::{PostedAt, RawPosting};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    struct Fixed(Vec<RawPosting>);

    #[async_trait::async_trait]
    impl SourceProvider for Fixed {
        async fn fetch_postings(&self) -> anyhow::Result<Vec<RawPosting>> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl SourceProvider for Broken {
        async fn fetch_postings(&self) -> anyhow::Result<Vec<RawPosting>> {
            anyhow::bail!("source down")
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn scenario_postings() -> Vec<RawPosting> {
        vec![
            RawPosting::new("Junior DevOps Engineer", "https://jobs.test/a", "test")
                .with_description("AWS, Docker, 1-2 years"),
            RawPosting::new("Senior SRE", "https://jobs.test/b", "test")
                .with_description("5+ years of AWS"),
            RawPosting::new("Cloud Engineer", "https://jobs.test/c", "test")
                .with_description("Kubernetes, CI/CD")
                .with_posted_at(PostedAt::Text("לפני 2 שעות".into())),
        ]
    }

    fn pipeline(
        providers: Vec<Box<dyn SourceProvider>>,
        store: Arc<MemoryStore>,
        notifier: Arc<CapturingNotifier>,
    ) -> JobPipeline {
        let profile = FilterProfile::new(&["junior"], &["aws", "docker", "kubernetes", "ci/cd"]);
        JobPipeline::new(
            Aggregator::new(providers),
            FilterHandle::from_profile(profile).unwrap(),
            store,
            notifier,
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn scenario_delivers_two_then_marks_delivered() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::new());
        let p = pipeline(vec![Box::new(Fixed(scenario_postings()))], store.clone(), notifier.clone());

        let report = p.run_at(now()).await;
        assert!(report.success);
        assert_eq!(report.outcome, RunOutcome::Delivered { count: 2 });
        assert_eq!(report.counts.total_found, 3);
        assert_eq!(report.counts.passed_filters, 2);
        assert_eq!(report.counts.fresh, 2);
        assert_eq!(report.counts.newly_admitted, 2);
        assert_eq!(
            notifier.delivered_urls(),
            vec!["https://jobs.test/a".to_string(), "https://jobs.test/c".to_string()]
        );
        assert_eq!(store.len(), 2);
        assert!(store.undelivered(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_leaves_postings_undelivered_then_fallback_resends() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::failing());
        let p = pipeline(vec![Box::new(Fixed(scenario_postings()))], store.clone(), notifier.clone());

        let first = p.run_at(now()).await;
        assert!(!first.success);
        assert!(matches!(
            first.outcome,
            RunOutcome::DeliveryFailed { stage: DeliveryStage::NewPostings, .. }
        ));
        assert_eq!(store.undelivered(10).await.unwrap().len(), 2);

        // Same postings again: all duplicates, so the recent ones are resurfaced.
        notifier.set_failing(false);
        let second = p.run_at(now() + Duration::minutes(10)).await;
        assert_eq!(second.counts.duplicates, 2);
        assert_eq!(second.outcome, RunOutcome::DeliveredFallback { count: 2 });
        assert!(store.undelivered(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_store_and_no_postings_reports_none_found() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::new());
        let p = pipeline(vec![Box::new(Broken)], store, notifier.clone());

        let report = p.run_at(now()).await;
        assert_eq!(report.outcome, RunOutcome::NoneFound);
        assert!(report.success);
        assert_eq!(report.counts.source_errors, 1);
        assert_eq!(notifier.captured(), vec![Captured::NoneFound]);
    }

    #[tokio::test]
    async fn preview_and_search_do_not_deliver() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::new());
        let p = pipeline(vec![Box::new(Fixed(scenario_postings()))], store.clone(), notifier.clone());

        let preview = p.preview_at(now(), 1).await;
        assert_eq!(preview.fresh, 2);
        assert_eq!(preview.postings.len(), 1);
        assert!(store.is_empty());

        let search = p.search_and_store_at(now()).await;
        assert_eq!(search.counts.newly_admitted, 2);
        assert_eq!(search.new_postings.len(), 2);
        assert_eq!(store.len(), 2);
        assert!(notifier.captured().is_empty());
    }

    #[tokio::test]
    async fn run_can_be_spawned_on_a_worker_task() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CapturingNotifier::new());
        let p = Arc::new(pipeline(
            vec![Box::new(Fixed(scenario_postings()))],
            store.clone(),
            notifier.clone(),
        ));

        let first = tokio::spawn({
            let p = p.clone();
            async move { p.run_at(now()).await }
        });
        assert_eq!(first.await.unwrap().outcome, RunOutcome::Delivered { count: 2 });

        let second = tokio::spawn({
            let p = p.clone();
            async move { p.run_at(now() + Duration::minutes(5)).await }
        });
        assert_eq!(
            second.await.unwrap().outcome,
            RunOutcome::DeliveredFallback { count: 2 }
        );
        assert!(store.undelivered(10).await.unwrap().is_empty());
    }
}
