// src/lib.rs
// Public library surface for the service binary, the CLI and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod freshness;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod posting;
pub mod relevance;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::pipeline::{JobPipeline, PipelineSettings, RunOutcome, RunReport};
pub use crate::posting::{compute_identity, AdmittedPosting, PostedAt, RawPosting, StoredPosting};

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::AppState;
use crate::config::AppConfig;
use crate::ingest::Aggregator;
use crate::notify::{Notifier, TelegramNotifier};
use crate::relevance::FilterHandle;
use crate::store::{PostingStore, SqliteStore};

pub const DEFAULT_LOG_FILTER: &str = "job_radar=info";

/// Install the global subscriber: `RUST_LOG` (default `job_radar=info`), compact text or
/// JSON when `LOG_FORMAT=json`. A no-op if a subscriber is already set (Shuttle installs
/// its own).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Everything the pipeline needs, wired from config: SQLite store, Telegram notifier,
/// configured providers and the shared filter handle.
pub async fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<(Arc<JobPipeline>, FilterHandle)> {
    let telegram = cfg
        .telegram
        .as_ref()
        .context("Telegram credentials are required for the service")?;
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(telegram));

    let store: Arc<dyn PostingStore> = Arc::new(
        SqliteStore::new(&cfg.database_url)
            .await
            .with_context(|| format!("opening store at {}", cfg.database_url))?,
    );

    let filter = FilterHandle::from_profile(cfg.profile.clone())?;
    let aggregator = Aggregator::from_config(cfg);
    tracing::info!(providers = ?aggregator.provider_names(), "sources configured");

    let pipeline = JobPipeline::new(
        aggregator,
        filter.clone(),
        store,
        notifier,
        PipelineSettings::default().with_window(cfg.freshness),
    );
    Ok((Arc::new(pipeline), filter))
}

/// Router state for the service.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<(AppState, FilterHandle)> {
    let (pipeline, filter) = build_pipeline(cfg).await?;
    let state = AppState::new(pipeline).with_webhook_secret(cfg.webhook_secret.clone());
    Ok((state, filter))
}
