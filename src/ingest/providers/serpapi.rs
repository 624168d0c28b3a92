//! Google Jobs through SerpAPI (`engine=google_jobs`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::providers::http_client;
use crate::ingest::types::SourceProvider;
use crate::ingest::SOURCE_FETCH_TIMEOUT;
use crate::posting::{PostedAt, RawPosting, UNKNOWN_COMPANY};

pub const SOURCE_TAG: &str = "google_jobs";
pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search";
const RESULTS_PER_QUERY: &str = "20";
const REQUEST_PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs_results: Vec<JobResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResult {
    #[serde(default)]
    title: String,
    company_name: Option<String>,
    location: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    apply_options: Vec<ApplyOption>,
    google_jobs_link: Option<String>,
    share_link: Option<String>,
    #[serde(default)]
    detected_extensions: DetectedExtensions,
}

#[derive(Debug, Deserialize)]
struct ApplyOption {
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectedExtensions {
    posted_at: Option<String>,
}

impl JobResult {
    /// First apply link, else the Google Jobs share link.
    fn url(&self) -> Option<String> {
        self.apply_options
            .first()
            .and_then(|o| o.link.clone())
            .or_else(|| self.google_jobs_link.clone())
            .or_else(|| self.share_link.clone())
            .filter(|u| !u.trim().is_empty())
    }

    fn into_posting(self, searched_location: &str) -> Option<RawPosting> {
        let url = self.url()?;
        let mut p = RawPosting::new(self.title, url, SOURCE_TAG)
            .with_company(
                self.company_name
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
            )
            .with_location(self.location.unwrap_or_else(|| searched_location.to_string()))
            .with_description(self.description);
        if let Some(text) = self.detected_extensions.posted_at {
            p = p.with_posted_at(PostedAt::Text(text));
        }
        Some(p)
    }
}

pub struct SerpApiProvider {
    mode: Mode,
}

enum Mode {
    Fixture { json: String, location: String },
    Http {
        api_key: String,
        endpoint: String,
        /// (keyword, location)
        queries: Vec<(String, String)>,
        client: reqwest::Client,
    },
}

impl SerpApiProvider {
    pub fn new(api_key: &str, keywords: &[String], locations: &[String]) -> Self {
        Self::with_endpoint(api_key, SERPAPI_ENDPOINT, keywords, locations)
    }

    pub fn with_endpoint(
        api_key: &str,
        endpoint: &str,
        keywords: &[String],
        locations: &[String],
    ) -> Self {
        let queries = keywords
            .iter()
            .flat_map(|k| locations.iter().map(move |l| (k.clone(), l.clone())))
            .collect();
        Self {
            mode: Mode::Http {
                api_key: api_key.to_string(),
                endpoint: endpoint.to_string(),
                queries,
                client: http_client(SOURCE_FETCH_TIMEOUT),
            },
        }
    }

    pub fn from_fixture_str(json: &str, location: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                json: json.to_string(),
                location: location.to_string(),
            },
        }
    }

    pub fn parse_results_from_str(s: &str, location: &str) -> Result<Vec<RawPosting>> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(s).context("parsing serpapi json")?;
        if let Some(err) = resp.error.filter(|_| resp.jobs_results.is_empty()) {
            // "Google hasn't returned any results" is an empty page, not a failure.
            if err.to_ascii_lowercase().contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            bail!("serpapi error: {err}");
        }
        let out: Vec<RawPosting> = resp
            .jobs_results
            .into_iter()
            .filter_map(|j| j.into_posting(location))
            .collect();

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_postings_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for SerpApiProvider {
    async fn fetch_postings(&self) -> Result<Vec<RawPosting>> {
        match &self.mode {
            Mode::Fixture { json, location } => Self::parse_results_from_str(json, location),

            Mode::Http {
                api_key,
                endpoint,
                queries,
                client,
            } => {
                let mut out = Vec::new();
                let mut last_err = None;
                let mut ok_queries = 0usize;
                for (i, (keyword, location)) in queries.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(REQUEST_PACING).await;
                    }
                    let fetched = async {
                        let body = client
                            .get(endpoint.as_str())
                            .query(&[
                                ("engine", "google_jobs"),
                                ("q", keyword.as_str()),
                                ("location", location.as_str()),
                                ("api_key", api_key.as_str()),
                                ("num", RESULTS_PER_QUERY),
                            ])
                            .send()
                            .await
                            .context("serpapi http get()")?
                            .error_for_status()
                            .context("serpapi http status")?
                            .text()
                            .await
                            .context("serpapi http .text()")?;
                        Self::parse_results_from_str(&body, location)
                    }
                    .await;
                    match fetched {
                        Ok(mut v) => {
                            tracing::debug!(target: "ingest", %keyword, %location, count = v.len(), "serpapi query done");
                            ok_queries += 1;
                            out.append(&mut v);
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = ?e, %keyword, %location, "serpapi query failed");
                            last_err = Some(e);
                        }
                    }
                }
                match last_err {
                    Some(e) if ok_queries == 0 => Err(e.context("every serpapi query failed")),
                    _ => Ok(out),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "serpapi"
    }
}
