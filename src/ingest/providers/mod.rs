// src/ingest/providers/mod.rs
pub mod rss_jobs;
pub mod serpapi;

use std::time::Duration;

/// Shared client for provider HTTP calls. Falls back to the default client when the
/// builder fails (TLS backend init), which only loses the timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("job-radar/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "ingest", error = %e, "http client builder failed; using default");
            reqwest::Client::new()
        })
}
