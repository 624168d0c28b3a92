// src/posting.rs
//! Posting records as they move through the pipeline:
//! `RawPosting` (aggregator output) → `AdmittedPosting` (passed relevance + freshness)
//! → `StoredPosting` (persisted, carries identity and delivery state).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_COMPANY: &str = "Unknown";

fn default_company() -> String {
    UNKNOWN_COMPANY.to_string()
}

/// Post time as reported by a source: either a real timestamp or a phrase
/// like "לפני 3 שעות" / "2 days ago" that still needs resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PostedAt {
    Absolute(DateTime<Utc>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_company")]
    pub company: String,
    #[serde(default)]
    pub location: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String, // e.g. "indeed", "google_jobs"
    #[serde(default)]
    pub posted_at: Option<PostedAt>,
}

impl RawPosting {
    /// Minimal constructor used by providers and tests; optional fields start empty.
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: default_company(),
            location: String::new(),
            url: url.into(),
            description: String::new(),
            source: source.into(),
            posted_at: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_posted_at(mut self, posted_at: PostedAt) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    /// Lowercased `title description company`, the text the relevance filter reads.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.company).to_lowercase()
    }

    pub fn identity(&self) -> String {
        compute_identity(&self.url, &self.title, &self.company)
    }
}

/// A posting that passed relevance and freshness. Built only by the freshness selector
/// (or re-hydrated from the store for fallback delivery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmittedPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub description: String,
    pub source: String,
    pub posted_at: Option<DateTime<Utc>>,
}

impl AdmittedPosting {
    pub(crate) fn from_raw(raw: RawPosting, resolved: Option<DateTime<Utc>>) -> Self {
        Self {
            title: raw.title,
            company: raw.company,
            location: raw.location,
            url: raw.url,
            description: raw.description,
            source: raw.source,
            posted_at: resolved,
        }
    }

    pub fn identity(&self) -> String {
        compute_identity(&self.url, &self.title, &self.company)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPosting {
    pub identity: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub description: String,
    pub source: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl StoredPosting {
    pub fn from_admitted(p: &AdmittedPosting, now: DateTime<Utc>) -> Self {
        Self {
            identity: p.identity(),
            title: p.title.clone(),
            company: p.company.clone(),
            location: p.location.clone(),
            url: p.url.clone(),
            description: p.description.clone(),
            source: p.source.clone(),
            posted_at: p.posted_at,
            first_seen_at: now,
            delivered: false,
            delivered_at: None,
        }
    }

    /// Timestamp used for recency ordering: post time when known, else first sighting.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.first_seen_at)
    }

    pub fn to_admitted(&self) -> AdmittedPosting {
        AdmittedPosting {
            title: self.title.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
            url: self.url.clone(),
            description: self.description.clone(),
            source: self.source.clone(),
            posted_at: self.posted_at,
        }
    }
}

/// Dedup key: hex SHA-256 of lowercase `url + title + company`.
/// No normalization beyond lowercasing.
pub fn compute_identity(url: &str, title: &str, company: &str) -> String {
    use sha2::{Digest, Sha256};
    let key = format!("{url}{title}{company}").to_lowercase();
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic_and_case_insensitive() {
        let a = compute_identity("https://x.test/1", "DevOps Engineer", "Acme");
        let b = compute_identity("HTTPS://X.TEST/1", "devops engineer", "ACME");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn identity_changes_with_any_field() {
        let base = compute_identity("https://x.test/1", "DevOps Engineer", "Acme");
        assert_ne!(base, compute_identity("https://x.test/2", "DevOps Engineer", "Acme"));
        assert_ne!(base, compute_identity("https://x.test/1", "DevOps Engineers", "Acme"));
        assert_ne!(base, compute_identity("https://x.test/1", "DevOps Engineer", "Acme Ltd"));
    }

    #[test]
    fn missing_company_deserializes_as_unknown() {
        let p: RawPosting =
            serde_json::from_str(r#"{"title":"SRE","url":"https://x.test/9"}"#).unwrap();
        assert_eq!(p.company, UNKNOWN_COMPANY);
        assert!(p.posted_at.is_none());
    }

    #[test]
    fn search_text_concatenates_lowercase() {
        let p = RawPosting::new("Junior DevOps", "u", "indeed")
            .with_description("AWS and Docker")
            .with_company("Acme");
        assert_eq!(p.search_text(), "junior devops aws and docker acme");
    }
}
