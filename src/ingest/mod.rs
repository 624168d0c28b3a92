// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::config::AppConfig;
use crate::ingest::providers::{rss_jobs::RssJobsProvider, serpapi::SerpApiProvider};
use crate::ingest::types::{Aggregated, SourceProvider};
use crate::posting::{RawPosting, UNKNOWN_COMPANY};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::Duration;

pub const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_FIELD_CHARS: usize = 5000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_postings_total", "Postings parsed from providers.");
        describe_counter!(
            "ingest_kept_total",
            "Postings kept after normalization and URL dedup."
        );
        describe_counter!("ingest_dropped_no_url_total", "Postings dropped for a missing URL.");
        describe_counter!("ingest_dedup_total", "Postings removed as duplicate URLs.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when the aggregator last ran."
        );
    });
}

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_FIELD_CHARS {
        out = out.chars().take(MAX_FIELD_CHARS).collect();
    }
    out
}

/// Normalize every text field in place; empty company becomes "Unknown".
pub fn normalize_posting(mut p: RawPosting) -> RawPosting {
    p.title = normalize_text(&p.title);
    p.company = normalize_text(&p.company);
    if p.company.is_empty() {
        p.company = UNKNOWN_COMPANY.to_string();
    }
    p.location = normalize_text(&p.location);
    p.description = normalize_text(&p.description);
    p.url = p.url.trim().to_string();
    p
}

/// Normalize, drop URL-less records, collapse duplicate URLs (first occurrence wins).
/// Returns (kept, dropped_no_url, duplicate_urls).
pub fn normalize_and_dedup(raw: Vec<RawPosting>) -> (Vec<RawPosting>, usize, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(raw.len());
    let mut no_url = 0usize;
    let mut dupes = 0usize;

    for p in raw {
        let p = normalize_posting(p);
        if p.url.is_empty() {
            no_url += 1;
            continue;
        }
        if !seen.insert(p.url.clone()) {
            dupes += 1;
            continue;
        }
        kept.push(p);
    }
    (kept, no_url, dupes)
}

/// Runs every provider, isolating failures per source.
pub struct Aggregator {
    providers: Vec<Box<dyn SourceProvider>>,
}

impl Aggregator {
    pub fn new(providers: Vec<Box<dyn SourceProvider>>) -> Self {
        Self { providers }
    }

    /// Providers enabled by configuration: RSS unless disabled, SerpAPI when a key is set.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut providers: Vec<Box<dyn SourceProvider>> = Vec::new();
        if let Some(template) = &cfg.rss_feed_template {
            providers.push(Box::new(RssJobsProvider::from_template(
                template,
                &cfg.search_keywords,
                &cfg.search_locations,
            )));
        }
        if let Some(key) = &cfg.serpapi_key {
            providers.push(Box::new(SerpApiProvider::new(
                key,
                &cfg.search_keywords,
                &cfg.search_locations,
            )));
        } else {
            tracing::info!(target: "ingest", "SERPAPI_KEY not set; Google Jobs search disabled");
        }
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn collect(&self) -> Aggregated {
        ensure_metrics_described();

        let mut raw = Vec::new();
        let mut source_errors = 0usize;
        for p in &self.providers {
            match p.fetch_postings().await {
                Ok(mut v) => {
                    tracing::info!(target: "ingest", provider = p.name(), count = v.len(), "provider fetched");
                    raw.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                    counter!("ingest_provider_errors_total").increment(1);
                    source_errors += 1;
                }
            }
        }

        let total_raw = raw.len();
        let (postings, dropped_no_url, duplicate_urls) = normalize_and_dedup(raw);

        counter!("ingest_kept_total").increment(postings.len() as u64);
        counter!("ingest_dropped_no_url_total").increment(dropped_no_url as u64);
        counter!("ingest_dedup_total").increment(duplicate_urls as u64);
        gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            target: "ingest",
            total_raw,
            unique = postings.len(),
            duplicate_urls,
            source_errors,
            "aggregation done"
        );

        Aggregated {
            postings,
            total_raw,
            dropped_no_url,
            duplicate_urls,
            source_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>AWS&nbsp;&amp;&nbsp;Docker</p>\n\n<b>Linux</b>  ";
        assert_eq!(normalize_text(s), "AWS & Docker Linux");
    }

    #[test]
    fn empty_company_becomes_unknown() {
        let p = normalize_posting(RawPosting::new(" SRE ", " https://x.test/1 ", "t").with_company("  "));
        assert_eq!(p.company, UNKNOWN_COMPANY);
        assert_eq!(p.title, "SRE");
        assert_eq!(p.url, "https://x.test/1");
    }

    #[test]
    fn dedup_by_url_first_wins() {
        let raw = vec![
            RawPosting::new("A", "https://x.test/1", "indeed"),
            RawPosting::new("B", "", "indeed"),
            RawPosting::new("C", "https://x.test/1", "google_jobs"),
            RawPosting::new("D", "https://x.test/2", "google_jobs"),
        ];
        let (kept, no_url, dupes) = normalize_and_dedup(raw);
        let titles: Vec<&str> = kept.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "D"]);
        assert_eq!((no_url, dupes), (1, 1));
    }
}
