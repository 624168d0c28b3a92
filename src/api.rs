use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::history::RunHistory;
use crate::metrics::Metrics;
use crate::pipeline::{JobPipeline, PREVIEW_LIMIT};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";
const TEST_MESSAGE: &str = "🧪 *Test message*\n\nJob radar is up and can reach this chat.";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<JobPipeline>,
    pub history: Arc<RunHistory>,
    pub webhook_secret: Option<String>,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(pipeline: Arc<JobPipeline>) -> Self {
        Self {
            pipeline,
            history: Arc::new(RunHistory::with_capacity(200)),
            webhook_secret: None,
            metrics: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Structured JSON error; handlers never leak a raw fault.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "status": "error", "message": self.message })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/trigger", post(webhook_trigger))
        .route("/jobs/search", post(jobs_search))
        .route("/jobs/run", post(jobs_run))
        .route("/runs/last", get(runs_last))
        .route("/runs", get(runs_list))
        .route("/stats", get(stats))
        .route("/test/notify", get(test_notify))
        .route("/debug/search", get(debug_search))
        .route("/metrics", get(metrics_text))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "job-radar" }))
}

async fn webhook_trigger(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.webhook_secret {
        let given = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if given != secret {
            warn!(target: "api", "webhook rejected: bad or missing secret");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "error", "message": "invalid webhook secret" })),
            )
                .into_response();
        }
    }

    let pipeline = state.pipeline.clone();
    let history = state.history.clone();
    tokio::spawn(async move {
        let report = pipeline.run().await;
        if !report.success {
            error!(target: "api", outcome = ?report.outcome, "background run failed");
        }
        history.push(report);
    });
    info!(target: "api", "webhook accepted; run started in background");

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "Job search started in background; see /runs/last for the result"
        })),
    )
        .into_response()
}

async fn jobs_search(State(state): State<AppState>) -> Json<Value> {
    let report = state.pipeline.search_and_store().await;
    Json(json!({
        "status": "success",
        "jobs_found": report.counts.total_found,
        "jobs_filtered": report.counts.passed_filters,
        "jobs_fresh": report.counts.fresh,
        "new_jobs": report.counts.newly_admitted,
        "duplicates": report.counts.duplicates,
        "source_errors": report.counts.source_errors,
    }))
}

async fn jobs_run(State(state): State<AppState>) -> Response {
    let report = state.pipeline.run().await;
    state.history.push(report.clone());
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report)).into_response()
}

async fn runs_last(State(state): State<AppState>) -> Response {
    match state.history.last() {
        Some(r) => Json(r).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "no runs yet" })),
        )
            .into_response(),
    }
}

async fn runs_list(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let limit = q
        .get("limit")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(20)
        .min(200);
    let runs = state.history.snapshot_last_n(limit);
    Json(json!({ "count": runs.len(), "runs": runs }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let s = state.pipeline.stats().await.map_err(|e| {
        error!(target: "api", error = %e, "stats query failed");
        ApiError::internal(e.to_string())
    })?;
    Ok(Json(json!({
        "date": s.date,
        "jobs_found_today": s.today_postings,
        "runs_recorded": state.history.len(),
    })))
}

async fn test_notify(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .pipeline
        .send_test_message(TEST_MESSAGE)
        .await
        .map_err(|e| ApiError::internal(format!("test message failed: {e}")))?;
    Ok(Json(json!({
        "status": "success",
        "notifier": state.pipeline.notifier_name(),
    })))
}

async fn debug_search(State(state): State<AppState>) -> Json<Value> {
    let preview = state.pipeline.preview(PREVIEW_LIMIT).await;
    Json(json!({
        "status": "success",
        "jobs_found": preview.total_found,
        "jobs_filtered": preview.passed_filters,
        "jobs_fresh": preview.fresh,
        "source_errors": preview.source_errors,
        "jobs": preview.postings,
    }))
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(m) => m.render().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "metrics recorder not installed" })),
        )
            .into_response(),
    }
}
