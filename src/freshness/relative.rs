// src/freshness/relative.rs
//! Relative post-time phrases ("לפני 3 שעות", "2 days ago", "אתמול") → timestamps.
//! Rules are tried in a fixed order; a rule whose number is out of range does not
//! stop the search, the next rule still gets a chance.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

fn re(p: &str) -> Regex {
    Regex::new(&format!("(?i){p}")).expect("relative-time regex")
}

static FEW_MINUTES: Lazy<Regex> = Lazy::new(|| {
    re(r"לפני\s*(?:מספר|כמה)\s*דקות?|\ba\s+few\s+minutes?\s+ago\b|\bjust\s+now\b")
});
static FEW_HOURS: Lazy<Regex> =
    Lazy::new(|| re(r"לפני\s*(?:מספר|כמה)\s*שעות?|\ba\s+few\s+hours?\s+ago\b"));
static N_MINUTES: Lazy<Regex> =
    Lazy::new(|| re(r"לפני\s*(\d+)\s*(?:דקות|דקה)|\b(\d+)\s*(?:minutes?|mins?)\s+ago\b"));
static N_HOURS: Lazy<Regex> =
    Lazy::new(|| re(r"לפני\s*(\d+)\s*(?:שעות|שעה)|\b(\d+)\s*(?:hours?|hrs?)\s+ago\b"));
static ONE_HOUR: Lazy<Regex> = Lazy::new(|| re(r"לפני\s*שעה\b|\ban\s+hour\s+ago\b"));
static TWO_HOURS: Lazy<Regex> = Lazy::new(|| re(r"לפני\s*שעתיים"));
static TODAY: Lazy<Regex> = Lazy::new(|| re(r"היום|\btoday\b|\bjust\s+posted\b"));
static N_DAYS: Lazy<Regex> =
    Lazy::new(|| re(r"לפני\s*(\d+)\s*(?:ימים|יום)|\b(\d+)\s*days?\s+ago\b"));
static ONE_DAY: Lazy<Regex> =
    Lazy::new(|| re(r"אתמול|\byesterday\b|לפני\s*יום\b|\ba\s+day\s+ago\b"));
static TWO_DAYS: Lazy<Regex> = Lazy::new(|| re(r"לפני\s*יומיים"));
static N_WEEKS: Lazy<Regex> =
    Lazy::new(|| re(r"לפני\s*(\d+)\s*(?:שבועות|שבוע)|\b(\d+)\s*weeks?\s+ago\b"));
static ONE_WEEK: Lazy<Regex> = Lazy::new(|| re(r"לפני\s*שבוע\b|\ba\s+week\s+ago\b"));
static TWO_WEEKS: Lazy<Regex> = Lazy::new(|| re(r"לפני\s*שבועיים"));

/// First numeric capture of either alternative (Hebrew or English).
fn number(re: &Regex, text: &str) -> Option<i64> {
    let caps = re.captures(text)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

/// Resolve a relative phrase against `now`. `None` when no rule yields a valid value.
pub fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if FEW_MINUTES.is_match(text) {
        return Some(now - Duration::minutes(5));
    }
    if FEW_HOURS.is_match(text) {
        return Some(now - Duration::hours(2));
    }
    if let Some(n) = number(&N_MINUTES, text) {
        if n < 10_080 {
            return Some(now - Duration::minutes(n));
        }
    }
    if let Some(n) = number(&N_HOURS, text) {
        if n < 48 {
            return Some(now - Duration::hours(n));
        }
    }
    if TWO_HOURS.is_match(text) {
        return Some(now - Duration::hours(2));
    }
    if ONE_HOUR.is_match(text) {
        return Some(now - Duration::hours(1));
    }
    if TODAY.is_match(text) {
        return Some(now - Duration::hours(2));
    }
    if let Some(n) = number(&N_DAYS, text) {
        if n == 0 {
            return Some(now - Duration::hours(2));
        }
        if n <= 7 {
            return Some(now - Duration::days(n));
        }
    }
    if TWO_DAYS.is_match(text) {
        return Some(now - Duration::days(2));
    }
    if ONE_DAY.is_match(text) {
        return Some(now - Duration::days(1));
    }
    if let Some(n) = number(&N_WEEKS, text) {
        if n <= 2 {
            return Some(now - Duration::weeks(n));
        }
    }
    if TWO_WEEKS.is_match(text) {
        return Some(now - Duration::weeks(2));
    }
    if ONE_WEEK.is_match(text) {
        return Some(now - Duration::weeks(1));
    }
    None
}
