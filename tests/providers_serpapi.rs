// tests/providers_serpapi.rs
use job_radar::ingest::providers::serpapi::{SerpApiProvider, SOURCE_TAG};
use job_radar::ingest::types::SourceProvider;
use job_radar::posting::{PostedAt, UNKNOWN_COMPANY};

const SERP_JSON: &str = include_str!("fixtures/serpapi_jobs.json");

#[tokio::test]
async fn fixture_yields_linked_results() {
    let provider = SerpApiProvider::from_fixture_str(SERP_JSON, "Israel");

    let items = provider.fetch_postings().await.expect("serpapi parse ok");
    assert_eq!(items.len(), 3, "result without any link should be skipped");
    assert!(items.iter().all(|p| p.source == SOURCE_TAG));
}

#[test]
fn apply_link_wins_and_location_is_kept() {
    let items = SerpApiProvider::parse_results_from_str(SERP_JSON, "Israel").expect("parse");

    assert_eq!(items[0].url, "https://apply.example.com/delta/devops");
    assert_eq!(items[0].company, "Delta Cloud");
    assert_eq!(items[0].location, "Tel Aviv-Yafo, Israel");
    assert_eq!(
        items[0].posted_at,
        Some(PostedAt::Text("לפני 5 שעות".into()))
    );

    assert_eq!(items[1].url, "https://www.google.com/search?q=epsilon-devops");
    assert_eq!(items[1].location, "Haifa, Israel");
}

#[test]
fn missing_location_falls_back_to_searched_one() {
    let items = SerpApiProvider::parse_results_from_str(SERP_JSON, "Remote").expect("parse");
    let zeta = items.iter().find(|p| p.company == "Zeta").expect("zeta");
    assert_eq!(zeta.location, "Remote");
}

#[test]
fn blank_company_is_unknown() {
    let json = r#"{"jobs_results":[{"title":"SRE","company_name":"  ","share_link":"https://g.test/1"}]}"#;
    let items = SerpApiProvider::parse_results_from_str(json, "Israel").expect("parse");
    assert_eq!(items[0].company, UNKNOWN_COMPANY);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_provider_error() {
    // Port 9 (discard) on loopback refuses connections.
    let provider = SerpApiProvider::with_endpoint(
        "key",
        "http://127.0.0.1:9/search",
        &["devops".to_string()],
        &["Israel".to_string()],
    );
    assert!(provider.fetch_postings().await.is_err());
}
