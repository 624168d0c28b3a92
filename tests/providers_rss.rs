// tests/providers_rss.rs
use job_radar::ingest::providers::rss_jobs::{RssJobsProvider, SOURCE_TAG};
use job_radar::ingest::types::SourceProvider;
use job_radar::posting::{PostedAt, UNKNOWN_COMPANY};

const JOBS_XML: &str = include_str!("fixtures/jobs_rss.xml");

#[tokio::test]
async fn fixture_parses_items_with_links_only() {
    let provider = RssJobsProvider::from_fixture_str(JOBS_XML, "Israel");

    let items = provider.fetch_postings().await.expect("rss parse ok");
    assert_eq!(items.len(), 4, "item without a link should be skipped");
    assert!(items.iter().all(|p| p.source == SOURCE_TAG));
    assert!(items.iter().all(|p| p.location == "Israel"));
    assert!(items.iter().all(|p| !p.url.is_empty()));
}

#[tokio::test]
async fn company_comes_from_title_suffix() {
    let items = RssJobsProvider::parse_items_from_str(JOBS_XML, "Israel").expect("parse");

    assert_eq!(items[0].company, "Acme Ltd");
    assert_eq!(items[1].company, "Beta Systems");
    let platform = items
        .iter()
        .find(|p| p.url.ends_with("/platform"))
        .expect("platform item");
    assert_eq!(platform.company, UNKNOWN_COMPANY);
}

#[tokio::test]
async fn pub_date_becomes_absolute_timestamp() {
    let items = RssJobsProvider::parse_items_from_str(JOBS_XML, "Israel").expect("parse");

    match &items[0].posted_at {
        Some(PostedAt::Absolute(dt)) => {
            assert_eq!(dt.to_rfc3339(), "2025-03-10T08:00:00+00:00");
        }
        other => panic!("expected absolute pubDate, got {other:?}"),
    }
    let platform = items.iter().find(|p| p.url.ends_with("/platform")).unwrap();
    assert!(platform.posted_at.is_none(), "no pubDate means no timestamp");
}

#[tokio::test]
async fn escaped_html_survives_as_text_until_normalization() {
    let items = RssJobsProvider::parse_items_from_str(JOBS_XML, "Israel").expect("parse");
    // The provider decodes XML escaping; tag stripping happens in the aggregator.
    assert!(items[0].description.contains("<b>AWS</b>"));
}

#[test]
fn malformed_xml_is_an_error() {
    let res = RssJobsProvider::parse_items_from_str("<rss><channel><item>", "Israel");
    assert!(res.is_err());
}
