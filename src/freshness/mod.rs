// src/freshness/mod.rs
//! Freshness selector: decide which relevant postings are recent enough to admit.
//! Postings without a usable timestamp are admitted (leniency); postings with a
//! resolved timestamp outside the window never are.

pub mod relative;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::posting::{AdmittedPosting, PostedAt, RawPosting};
use crate::relevance::truncate_chars;

pub use relative::parse_relative;

pub const DEFAULT_WINDOW_HOURS: i64 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum FreshnessWindow {
    #[default]
    Rolling72h,
    /// Caller override: replaces the 72h cutoff with `now - n days`, narrower or wider.
    Days(u32),
}

impl FreshnessWindow {
    /// `0` means "no override".
    pub fn from_days(days: u32) -> Self {
        if days == 0 {
            Self::Rolling72h
        } else {
            Self::Days(days)
        }
    }

    /// Oldest age this window admits.
    pub fn max_age(&self) -> Duration {
        match self {
            Self::Rolling72h => Duration::hours(DEFAULT_WINDOW_HOURS),
            Self::Days(n) => Duration::days(i64::from(*n)),
        }
    }

    pub fn admits(&self, posted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - posted_at <= self.max_age()
    }
}

/// Per-batch counters, logged after every selection and surfaced in run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
    pub with_date: usize,
    pub without_date: usize,
    pub in_window: usize,
    pub too_old: usize,
}

impl FreshnessReport {
    pub fn admitted(&self) -> usize {
        self.in_window + self.without_date
    }
}

/// Absolute formats seen in feeds and APIs. Date-only values are taken as midnight UTC.
pub fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            let midnight = d.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }
    None
}

/// Best-effort post time for a raw posting.
pub fn resolve_posted_at(posted_at: Option<&PostedAt>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match posted_at? {
        PostedAt::Absolute(dt) => Some(*dt),
        PostedAt::Text(s) => parse_absolute(s).or_else(|| parse_relative(s, now)),
    }
}

/// Keep postings inside `window`, resolving timestamps on the way. Order is preserved.
pub fn select_recent(
    postings: Vec<RawPosting>,
    window: FreshnessWindow,
    now: DateTime<Utc>,
) -> (Vec<AdmittedPosting>, FreshnessReport) {
    let mut report = FreshnessReport::default();
    let mut out = Vec::with_capacity(postings.len());

    for raw in postings {
        match resolve_posted_at(raw.posted_at.as_ref(), now) {
            None => {
                report.without_date += 1;
                info!(
                    target: "freshness",
                    title = %truncate_chars(&raw.title, 50),
                    source = %raw.source,
                    "no usable post time; admitting"
                );
                out.push(AdmittedPosting::from_raw(raw, None));
            }
            Some(ts) => {
                report.with_date += 1;
                if window.admits(ts, now) {
                    report.in_window += 1;
                    out.push(AdmittedPosting::from_raw(raw, Some(ts)));
                } else {
                    report.too_old += 1;
                    debug!(
                        target: "freshness",
                        title = %truncate_chars(&raw.title, 50),
                        hours_old = (now - ts).num_hours(),
                        "posting outside window"
                    );
                }
            }
        }
    }

    info!(
        target: "freshness",
        with_date = report.with_date,
        without_date = report.without_date,
        in_window = report.in_window,
        too_old = report.too_old,
        window_hours = window.max_age().num_hours(),
        "freshness selection done"
    );
    (out, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn at(text: &str) -> RawPosting {
        RawPosting::new("DevOps", format!("https://x.test/{text}"), "test")
            .with_posted_at(PostedAt::Text(text.into()))
    }

    #[test]
    fn window_boundaries() {
        let w = FreshnessWindow::default();
        assert!(w.admits(now() - Duration::hours(72), now()));
        assert!(!w.admits(now() - Duration::hours(73), now()));
        assert!(w.admits(now() + Duration::hours(5), now()));

        let wide = FreshnessWindow::from_days(7);
        assert!(wide.admits(now() - Duration::days(6), now()));
        assert!(!wide.admits(now() - Duration::days(8), now()));

        let narrow = FreshnessWindow::Days(1);
        assert!(narrow.admits(now() - Duration::hours(24), now()));
        assert!(!narrow.admits(now() - Duration::hours(60), now()));
        assert_eq!(narrow.max_age(), Duration::hours(24));
    }

    #[test]
    fn absolute_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(parse_absolute("2025-03-09"), Some(expected));
        assert_eq!(parse_absolute("09/03/2025"), Some(expected));
        assert_eq!(parse_absolute("2025-03-09T00:00:00Z"), Some(expected));
        assert_eq!(parse_absolute("Sun, 09 Mar 2025 00:00:00 +0000"), Some(expected));
        assert_eq!(parse_absolute("3 days ago"), None);
    }

    #[test]
    fn select_recent_counts_and_leniency() {
        let postings = vec![
            at("לפני 3 שעות"),
            RawPosting::new("Stale", "https://x.test/stale", "test")
                .with_posted_at(PostedAt::Absolute(now() - Duration::hours(100))),
            RawPosting::new("No date", "https://x.test/none", "test"),
            at("sometime soon"),
            RawPosting::new("Old", "https://x.test/old", "test")
                .with_posted_at(PostedAt::Absolute(now() - Duration::days(10))),
        ];
        let (kept, report) = select_recent(postings, FreshnessWindow::default(), now());

        let urls: Vec<&str> = kept.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://x.test/לפני 3 שעות", "https://x.test/none", "https://x.test/sometime soon"]
        );
        assert_eq!(kept[0].posted_at, Some(now() - Duration::hours(3)));
        assert!(kept[1].posted_at.is_none());
        assert_eq!(
            report,
            FreshnessReport { with_date: 3, without_date: 2, in_window: 1, too_old: 2 }
        );
        assert_eq!(report.admitted(), 3);
    }
}
