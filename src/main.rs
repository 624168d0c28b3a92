//! Job radar service — binary entrypoint.
//! Boots the Axum HTTP server with the pipeline, run history and metrics wired in.

use shuttle_axum::ShuttleAxum;

use job_radar::config::AppConfig;
use job_radar::metrics::Metrics;
use job_radar::relevance::start_hot_reload_thread;
use job_radar::{build_state, init_tracing, router};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().map_err(|e| shuttle_runtime::Error::Custom(e.into()))?;
    tracing::info!(
        freshness = ?cfg.freshness,
        keywords = cfg.profile.keywords.len(),
        profile = ?cfg.profile_path,
        "configuration loaded"
    );

    let metrics = match Metrics::init(cfg.freshness) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed; /metrics disabled");
            None
        }
    };

    let (state, filter) = build_state(&cfg)
        .await
        .map_err(shuttle_runtime::Error::Custom)?;

    // Dev-only profile hot reload (PROFILE_HOT_RELOAD=1).
    if let Some(path) = cfg.profile_path.clone() {
        start_hot_reload_thread(filter, path);
    }

    let app = router(state.with_metrics(metrics));
    Ok(app.into())
}
