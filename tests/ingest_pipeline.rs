// tests/ingest_pipeline.rs
use anyhow::Result;
use async_trait::async_trait;
use job_radar::ingest::providers::rss_jobs::RssJobsProvider;
use job_radar::ingest::providers::serpapi::SerpApiProvider;
use job_radar::ingest::types::SourceProvider;
use job_radar::ingest::Aggregator;
use job_radar::posting::RawPosting;

const JOBS_XML: &str = include_str!("fixtures/jobs_rss.xml");
const SERP_JSON: &str = include_str!("fixtures/serpapi_jobs.json");

struct MockProvider(Vec<RawPosting>);

#[async_trait]
impl SourceProvider for MockProvider {
    async fn fetch_postings(&self) -> Result<Vec<RawPosting>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "MockProvider"
    }
}

struct DownProvider;

#[async_trait]
impl SourceProvider for DownProvider {
    async fn fetch_postings(&self) -> Result<Vec<RawPosting>> {
        anyhow::bail!("connection reset")
    }
    fn name(&self) -> &'static str {
        "DownProvider"
    }
}

#[tokio::test]
async fn aggregator_normalizes_text_fields() {
    let raw = RawPosting::new(
        "<b>Junior&nbsp;DevOps</b>",
        "https://example.test/x",
        "mock",
    )
    .with_description("&ldquo;AWS&rdquo;   and\n\nDocker")
    .with_company("");
    let agg = Aggregator::new(vec![Box::new(MockProvider(vec![raw]))]);

    let out = agg.collect().await;
    assert_eq!(out.postings.len(), 1);
    assert_eq!(out.postings[0].title, "Junior DevOps");
    assert_eq!(out.postings[0].description, r#""AWS" and Docker"#);
    assert_eq!(out.postings[0].company, "Unknown");
}

#[tokio::test]
async fn fixtures_from_both_sources_are_merged() {
    let agg = Aggregator::new(vec![
        Box::new(RssJobsProvider::from_fixture_str(JOBS_XML, "Israel")),
        Box::new(SerpApiProvider::from_fixture_str(SERP_JSON, "Israel")),
    ]);
    assert_eq!(agg.provider_names(), vec!["rss_jobs", "serpapi"]);

    let out = agg.collect().await;
    assert_eq!(out.total_raw, 7);
    assert_eq!(out.postings.len(), 7);
    assert_eq!(out.source_errors, 0);
    assert!(out.postings[0].description.contains("AWS & Docker"));
    assert!(!out.postings[0].description.contains('<'));
}

#[tokio::test]
async fn failing_provider_does_not_sink_the_others() {
    let keep = RawPosting::new("SRE", "https://example.test/1", "mock");
    let agg = Aggregator::new(vec![
        Box::new(DownProvider),
        Box::new(MockProvider(vec![keep])),
    ]);

    let out = agg.collect().await;
    assert_eq!(out.source_errors, 1);
    assert_eq!(out.postings.len(), 1);
}

#[tokio::test]
async fn duplicate_urls_across_sources_are_collapsed() {
    let a = RawPosting::new("A", "https://example.test/same", "indeed");
    let b = RawPosting::new("B", "https://example.test/same", "google_jobs");
    let c = RawPosting::new("C", "   ", "google_jobs");
    let agg = Aggregator::new(vec![
        Box::new(MockProvider(vec![a])),
        Box::new(MockProvider(vec![b, c])),
    ]);

    let out = agg.collect().await;
    assert_eq!(out.total_raw, 3);
    assert_eq!(out.duplicate_urls, 1);
    assert_eq!(out.dropped_no_url, 1);
    assert_eq!(out.postings.len(), 1);
    assert_eq!(out.postings[0].title, "A");
}
