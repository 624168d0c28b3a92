use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::providers::http_client;
use crate::ingest::types::SourceProvider;
use crate::ingest::SOURCE_FETCH_TIMEOUT;
use crate::posting::{PostedAt, RawPosting, UNKNOWN_COMPANY};

pub const SOURCE_TAG: &str = "indeed";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_pub_date(raw: &str) -> PostedAt {
    OffsetDateTime::parse(raw.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
        .map(PostedAt::Absolute)
        .unwrap_or_else(|| PostedAt::Text(raw.trim().to_string()))
}

/// Feed titles look like "DevOps Engineer - Acme Ltd"; the last segment is the company.
pub fn company_from_title(title: &str) -> Option<String> {
    let (_, company) = title.rsplit_once(" - ")?;
    let company = company.trim();
    (!company.is_empty()).then(|| company.to_string())
}

/// `{keyword}` / `{location}` substitution with query-string escaping of spaces and commas.
pub fn feed_url(template: &str, keyword: &str, location: &str) -> String {
    let enc = |s: &str| s.trim().replace(' ', "+").replace(',', "%2C");
    template
        .replace("{keyword}", &enc(keyword))
        .replace("{location}", &enc(location))
}

pub struct RssJobsProvider {
    mode: Mode,
}

enum Mode {
    Fixture { xml: String, location: String },
    Http {
        /// (feed url, searched location)
        feeds: Vec<(String, String)>,
        client: reqwest::Client,
    },
}

impl RssJobsProvider {
    pub fn from_fixture_str(xml: &str, location: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                xml: xml.to_string(),
                location: location.to_string(),
            },
        }
    }

    /// One feed per keyword × location.
    pub fn from_template(template: &str, keywords: &[String], locations: &[String]) -> Self {
        let feeds = keywords
            .iter()
            .flat_map(|k| {
                locations
                    .iter()
                    .map(move |l| (feed_url(template, k, l), l.clone()))
            })
            .collect();
        Self {
            mode: Mode::Http {
                feeds,
                client: http_client(SOURCE_FETCH_TIMEOUT),
            },
        }
    }

    pub fn feed_count(&self) -> usize {
        match &self.mode {
            Mode::Fixture { .. } => 1,
            Mode::Http { feeds, .. } => feeds.len(),
        }
    }

    pub fn parse_items_from_str(s: &str, location: &str) -> Result<Vec<RawPosting>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing jobs rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = it.title.unwrap_or_default();
            let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            let company = company_from_title(&title).unwrap_or_else(|| UNKNOWN_COMPANY.to_string());
            let mut p = RawPosting::new(title, link, SOURCE_TAG)
                .with_company(company)
                .with_location(location)
                .with_description(it.description.unwrap_or_default());
            if let Some(raw) = it.pub_date.as_deref().filter(|d| !d.trim().is_empty()) {
                p = p.with_posted_at(parse_pub_date(raw));
            }
            out.push(p);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_postings_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for RssJobsProvider {
    async fn fetch_postings(&self) -> Result<Vec<RawPosting>> {
        match &self.mode {
            Mode::Fixture { xml, location } => Self::parse_items_from_str(xml, location),

            Mode::Http { feeds, client } => {
                let mut out = Vec::new();
                let mut last_err = None;
                let mut ok_feeds = 0usize;
                for (url, location) in feeds {
                    let fetched = async {
                        let resp = client
                            .get(url)
                            .send()
                            .await
                            .context("rss http get()")?
                            .error_for_status()
                            .context("rss http status")?;
                        let body = resp.text().await.context("rss http .text()")?;
                        Self::parse_items_from_str(&body, location)
                    }
                    .await;
                    match fetched {
                        Ok(mut v) => {
                            ok_feeds += 1;
                            out.append(&mut v);
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = ?e, provider = SOURCE_TAG, %url, "feed failed");
                            last_err = Some(e);
                        }
                    }
                }
                match last_err {
                    Some(e) if ok_feeds == 0 => Err(e.context("every rss feed failed")),
                    _ => Ok(out),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss_jobs"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
