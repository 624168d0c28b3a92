// src/relevance.rs
//! Relevance gate: experience-level tri-state + keyword matching, compiled once from a
//! `FilterProfile`. Also hosts the shared, hot-reloadable `FilterHandle`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::profile::{load_profile_from, FilterProfile};
use crate::error::ConfigError;
use crate::posting::RawPosting;

pub const ENV_RELEVANCE_DEV_LOG: &str = "RELEVANCE_DEV_LOG";
pub const ENV_PROFILE_HOT_RELOAD: &str = "PROFILE_HOT_RELOAD";

/* ----------------------------
Dev diagnostics
---------------------------- */

// Dev logging gate: RELEVANCE_DEV_LOG=1 AND a debug build (or SHUTTLE_ENV in {local,development,dev}).
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var(ENV_RELEVANCE_DEV_LOG).ok().as_deref() == Some("1");
    on && is_dev_env()
}

fn is_dev_env() -> bool {
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Never logs raw posting text, only a hashed id + short lists.
fn dev_log_verdict(text: &str, v: &Verdict) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(text);
    info!(
        target: "relevance",
        %id,
        admitted = v.admitted,
        experience = ?v.experience,
        matched = ?v.matched_keywords.iter().take(5).collect::<Vec<_>>(),
        reasons = ?v.reasons.iter().take(5).collect::<Vec<_>>()
    );
}

/* ----------------------------
Experience signal
---------------------------- */

/// Outcome of the experience-level check. `Unknown` never blocks a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceSignal {
    Accepted,
    Rejected,
    Unknown,
}

const NUM_ALT: &str = r"\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten|אחת|אחד|שתיים|שתי|שניים|שני|שלוש|שלושה|ארבע|ארבעה|חמש|חמישה|שש|שישה|שבע|שבעה|שמונה|תשע|תשעה|עשר|עשרה";

static RE_SENIOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(senior|sr\.?|lead|principal|architect)\b|\b(בכיר|בכירה|מוביל|מובילה|מנהל|מנהלת|ארכיטקט|ארכיטקטית)\b|ראש\s+צוות",
    )
    .expect("senior regex")
});

static RE_JUNIOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(junior|jr\.?|entry[\s\-]*level|associate|intern|internship|graduate)\b|ג['׳]וניור(ית)?|\b(זוטר|זוטרה|בוגר|בוגרת|מתחיל|מתחילה)\b",
    )
    .expect("junior regex")
});

static RE_NO_EXPERIENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bno\s+(prior\s+)?experience\b|לא\s+נדרש\s+ניסיון|ללא\s+ניסיון")
        .expect("no-experience regex")
});

// "3 years", "4-5 yrs", "2 to 3 years", "5+ years", "3-5 שנים", "שלוש שנות"
static RE_YEARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<a>{NUM_ALT})(?:\s*(?:-|–|—|to|עד)\s*(?P<b>{NUM_ALT}))?\s*\+?\s*(?:years?|yrs?|שנים|שנות)\b"
    ))
    .expect("years regex")
});

// Hebrew single-word durations: "שנתיים" (two years), "עד שנה" / "של שנה" (one year).
static RE_YEARS_HE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bשנתיים\b|\b(?:עד|של)\s+שנה\b").expect("hebrew years regex")
});

fn number_value(token: &str) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return Some(n);
    }
    let n = match token.to_lowercase().as_str() {
        "one" | "אחת" | "אחד" => 1,
        "two" | "שתיים" | "שתי" | "שניים" | "שני" => 2,
        "three" | "שלוש" | "שלושה" => 3,
        "four" | "ארבע" | "ארבעה" => 4,
        "five" | "חמש" | "חמישה" => 5,
        "six" | "שש" | "שישה" => 6,
        "seven" | "שבע" | "שבעה" => 7,
        "eight" | "שמונה" => 8,
        "nine" | "תשע" | "תשעה" => 9,
        "ten" | "עשר" | "עשרה" => 10,
        _ => return None,
    };
    Some(n)
}

/// Every numeric experience phrase in `text` as `(min, max)` bounds.
pub fn year_bounds(text: &str) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for caps in RE_YEARS.captures_iter(text) {
        let a = caps.name("a").and_then(|m| number_value(m.as_str()));
        let b = caps.name("b").and_then(|m| number_value(m.as_str()));
        match (a, b) {
            (Some(a), Some(b)) => out.push((a.min(b), a.max(b))),
            (Some(a), None) => out.push((a, a)),
            _ => {}
        }
    }
    for m in RE_YEARS_HE_WORD.find_iter(text) {
        let n = if m.as_str().contains("שנתיים") { 2 } else { 1 };
        out.push((n, n));
    }
    out
}

/* ----------------------------
Keyword patterns
---------------------------- */

/// Built-in spelling variants. Profile aliases are merged on top.
fn builtin_aliases() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        (
            "ci/cd",
            &["continuous integration", "continuous deployment", "continuous delivery"],
        ),
        ("github actions", &["gh actions"]),
        ("gitops", &["git ops"]),
        ("devops", &["dev ops"]),
        ("devsecops", &["dev sec ops", "dev security ops", "devops", "dev ops"]),
        ("dev sec ops", &["devsecops", "dev security ops"]),
        ("kubernetes", &["k8s"]),
    ];
    table
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

const SEP_CLASS: &str = r"[\s\-_/.]*";

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '_' | '/' | '.')
}

/// One spelling → regex fragment. Separator runs (`space - _ / .`) become optional
/// separators; word boundaries are added only where the spelling starts/ends with a
/// word character (so `c++` or `.net` still match).
fn spelling_pattern(spelling: &str) -> Option<String> {
    let parts: Vec<&str> = spelling.split(is_separator).filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }
    let body = parts
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join(SEP_CLASS);

    let first = spelling.trim().chars().next()?;
    let last = spelling.trim().chars().last()?;
    let lead = if first.is_alphanumeric() || first == '_' { r"\b" } else { "" };
    let trail = if last.is_alphanumeric() || last == '_' { r"\b" } else { "" };
    // Leading separators (".net") are kept literally.
    let prefix: String = spelling
        .trim()
        .chars()
        .take_while(|c| is_separator(*c))
        .collect();
    Some(format!("{lead}{}{body}{trail}", regex::escape(&prefix)))
}

#[derive(Debug)]
struct CompiledKeyword {
    keyword: String,
    re: Regex,
}

fn compile_keyword(
    keyword: &str,
    aliases: &BTreeMap<String, Vec<String>>,
) -> Result<CompiledKeyword, ConfigError> {
    let mut alts = Vec::new();
    if let Some(p) = spelling_pattern(keyword) {
        alts.push(p);
    }
    if let Some(extra) = aliases.get(keyword) {
        alts.extend(extra.iter().filter_map(|s| spelling_pattern(s)));
    }
    if alts.is_empty() {
        return Err(ConfigError::InvalidProfile(format!(
            "keyword {keyword:?} has no matchable characters"
        )));
    }
    let pattern = format!("(?i)(?:{})", alts.join("|"));
    let re = Regex::new(&pattern).map_err(|e| {
        ConfigError::InvalidProfile(format!("keyword {keyword:?} regex error: {e}"))
    })?;
    Ok(CompiledKeyword {
        keyword: keyword.to_string(),
        re,
    })
}

/* ----------------------------
Filter
---------------------------- */

/// Per-posting decision with explainability, in the spirit of a scored relevance result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Verdict {
    pub admitted: bool,
    pub experience: ExperienceSignal,
    pub matched_keywords: Vec<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug)]
pub struct RelevanceFilter {
    profile: FilterProfile,
    keywords: Vec<CompiledKeyword>,
}

impl RelevanceFilter {
    pub fn new(profile: FilterProfile) -> Result<Self, ConfigError> {
        let profile = profile.normalized()?;
        let mut aliases = builtin_aliases();
        for (k, v) in &profile.aliases {
            aliases.entry(k.clone()).or_default().extend(v.iter().cloned());
        }
        let keywords = profile
            .keywords
            .iter()
            .map(|k| compile_keyword(k, &aliases))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { profile, keywords })
    }

    pub fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    /// Experience tri-state over already-lowercased text. Reject markers win.
    pub fn experience(&self, text: &str) -> (ExperienceSignal, String) {
        if let Some(m) = RE_SENIOR.find(text) {
            return (ExperienceSignal::Rejected, format!("senior_marker:{}", m.as_str()));
        }
        let bounds = year_bounds(text);
        if let Some((min, _)) = bounds.iter().find(|(min, _)| *min >= 4) {
            return (ExperienceSignal::Rejected, format!("years_min:{min}"));
        }
        if let Some(m) = RE_JUNIOR.find(text) {
            return (ExperienceSignal::Accepted, format!("junior_marker:{}", m.as_str()));
        }
        if let Some((_, max)) = bounds.iter().find(|(_, max)| *max <= 3) {
            return (ExperienceSignal::Accepted, format!("years_max:{max}"));
        }
        if let Some(p) = self
            .profile
            .experience_phrases
            .iter()
            .find(|p| text.contains(p.as_str()))
        {
            return (ExperienceSignal::Accepted, format!("profile_phrase:{p}"));
        }
        if RE_NO_EXPERIENCE.is_match(text) {
            return (ExperienceSignal::Accepted, "no_experience_required".into());
        }
        (ExperienceSignal::Unknown, "experience_unknown".into())
    }

    /// Keywords (profile order) whose pattern occurs in `text`.
    pub fn matched_keywords(&self, text: &str) -> Vec<String> {
        self.keywords
            .iter()
            .filter(|k| k.re.is_match(text))
            .map(|k| k.keyword.clone())
            .collect()
    }

    pub fn evaluate(&self, posting: &RawPosting) -> Verdict {
        let text = posting.search_text();
        let (experience, why) = self.experience(&text);
        let mut reasons = vec![why];

        if experience == ExperienceSignal::Rejected {
            let v = Verdict {
                admitted: false,
                experience,
                matched_keywords: Vec::new(),
                reasons,
            };
            dev_log_verdict(&text, &v);
            return v;
        }

        let matched = self.matched_keywords(&text);
        let need = self.profile.min_keyword_matches;
        let keywords_ok = matched.len() >= need;
        reasons.push(format!(
            "keywords_{}:{}/{}",
            if keywords_ok { "ok" } else { "fail" },
            matched.len(),
            need
        ));

        let v = Verdict {
            admitted: keywords_ok,
            experience,
            matched_keywords: matched,
            reasons,
        };
        dev_log_verdict(&text, &v);
        v
    }

    pub fn admit(&self, posting: &RawPosting) -> bool {
        self.evaluate(posting).admitted
    }

    /// Keep admitted postings, preserving order.
    pub fn filter(&self, postings: Vec<RawPosting>) -> Vec<RawPosting> {
        let total = postings.len();
        let kept: Vec<RawPosting> = postings
            .into_iter()
            .filter(|p| {
                let v = self.evaluate(p);
                if !v.admitted {
                    debug!(
                        target: "relevance",
                        title = %truncate_chars(&p.title, 50),
                        reasons = ?v.reasons,
                        "posting filtered out"
                    );
                }
                v.admitted
            })
            .collect();
        info!(target: "relevance", total, kept = kept.len(), "relevance filter applied");
        kept
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// Shared handle to the current filter. Runs take a snapshot (`current`) so a reload
/// never changes the profile under a running pipeline.
#[derive(Clone)]
pub struct FilterHandle {
    inner: Arc<RwLock<Arc<RelevanceFilter>>>,
}

impl FilterHandle {
    pub fn new(filter: RelevanceFilter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(filter))),
        }
    }

    pub fn from_profile(profile: FilterProfile) -> Result<Self, ConfigError> {
        Ok(Self::new(RelevanceFilter::new(profile)?))
    }

    pub fn current(&self) -> Arc<RelevanceFilter> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, filter: RelevanceFilter) {
        match self.inner.write() {
            Ok(mut g) => *g = Arc::new(filter),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(filter),
        }
    }
}

/// Returns true if we should enable hot reload (dev/local only).
fn hot_reload_enabled() -> bool {
    let want = std::env::var(ENV_PROFILE_HOT_RELOAD).ok().as_deref() == Some("1");
    want && is_dev_env()
}

/// Poll `path` mtime every 2s and swap in a freshly compiled filter on change.
/// A profile that fails to load keeps the previous filter.
pub fn start_hot_reload_thread(handle: FilterHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => false,
                    Some(prev) => mtime > prev,
                };
                last_mtime = Some(mtime);
                if changed {
                    match load_profile_from(&path).and_then(RelevanceFilter::new) {
                        Ok(f) => {
                            handle.replace(f);
                            info!(target: "relevance", path = %path.display(), "profile reloaded");
                        }
                        Err(e) => {
                            warn!(target: "relevance", error = %e, "profile reload failed; keeping previous")
                        }
                    }
                }
            }
            thread::sleep(poll);
        }
    });
}

/* ----------------------------
Tests
---------------------------- */
