//! One pipeline run from the command line (cron, manual checks).
//!
//! Prints the run report as JSON; exit code 1 when the run did not succeed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use job_radar::config::AppConfig;
use job_radar::freshness::FreshnessWindow;
use job_radar::ingest::Aggregator;
use job_radar::notify::{Notifier, StdoutNotifier};
use job_radar::relevance::FilterHandle;
use job_radar::store::{MemoryStore, PostingStore};
use job_radar::{build_pipeline, init_tracing, JobPipeline, PipelineSettings};

#[derive(Parser)]
#[command(name = "run_once")]
#[command(about = "Run the job search pipeline once and exit")]
struct Cli {
    /// Freshness override in days (0 keeps the 72h window)
    #[arg(long)]
    days: Option<u32>,

    /// Memory store + stdout output; no Telegram credentials needed
    #[arg(long)]
    dry_run: bool,

    /// Search and store only, do not deliver
    #[arg(long)]
    search_only: bool,
}

async fn pipeline_for(cli: &Cli) -> Result<Arc<JobPipeline>> {
    let mut cfg = if cli.dry_run {
        AppConfig::from_env_dry_run()?
    } else {
        AppConfig::from_env()?
    };
    if let Some(days) = cli.days {
        cfg.freshness = FreshnessWindow::from_days(days);
    }

    if !cli.dry_run {
        let (pipeline, _filter) = build_pipeline(&cfg).await?;
        return Ok(pipeline);
    }

    let store: Arc<dyn PostingStore> = Arc::new(MemoryStore::new());
    let notifier: Arc<dyn Notifier> = Arc::new(StdoutNotifier);
    let filter = FilterHandle::from_profile(cfg.profile.clone()).context("building filter")?;
    Ok(Arc::new(JobPipeline::new(
        Aggregator::from_config(&cfg),
        filter,
        store,
        notifier,
        PipelineSettings::default().with_window(cfg.freshness),
    )))
}

async fn run(cli: Cli) -> Result<bool> {
    let pipeline = pipeline_for(&cli).await?;

    if cli.search_only {
        let report = pipeline.search_and_store().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    let report = pipeline.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = ?e, "run_once failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
