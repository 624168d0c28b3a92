// src/config/profile.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const ENV_PROFILE_PATH: &str = "JOB_PROFILE_PATH";
pub const DEFAULT_PROFILE_PATH: &str = "config/profile.toml";
const FALLBACK_JSON_PATH: &str = "config/profile.json";

pub const DEFAULT_EXPERIENCE_PHRASES: &[&str] = &["junior", "entry level", "associate", "0-3 years"];
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "jenkins",
    "aws",
    "eks",
    "github",
    "github actions",
    "git",
    "docker",
    "argocd",
    "gitops",
    "ci/cd",
    "devops",
    "pipeline",
    "linux",
    "python",
    "bash",
];

fn default_experience_phrases() -> Vec<String> {
    DEFAULT_EXPERIENCE_PHRASES.iter().map(|s| s.to_string()).collect()
}
fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
fn default_min_keyword_matches() -> usize {
    1
}

/// What the relevance filter admits. Immutable once handed to the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterProfile {
    /// Phrases that count as an explicit entry-level signal when found verbatim.
    #[serde(default = "default_experience_phrases")]
    pub experience_phrases: Vec<String>,
    /// Technology keywords; a posting needs `min_keyword_matches` of them.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_min_keyword_matches")]
    pub min_keyword_matches: usize,
    /// Extra spellings per keyword, merged over the built-in alias table.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self {
            experience_phrases: default_experience_phrases(),
            keywords: default_keywords(),
            min_keyword_matches: default_min_keyword_matches(),
            aliases: BTreeMap::new(),
        }
    }
}

impl FilterProfile {
    pub fn new<S: AsRef<str>>(experience_phrases: &[S], keywords: &[S]) -> Self {
        Self {
            experience_phrases: clean_list(experience_phrases.iter().map(|s| s.as_ref().to_string())),
            keywords: clean_list(keywords.iter().map(|s| s.as_ref().to_string())),
            min_keyword_matches: 1,
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_min_keyword_matches(mut self, n: usize) -> Self {
        self.min_keyword_matches = n;
        self
    }

    pub fn with_alias<S: AsRef<str>>(mut self, keyword: &str, spellings: &[S]) -> Self {
        self.aliases.insert(
            keyword.trim().to_lowercase(),
            clean_list(spellings.iter().map(|s| s.as_ref().to_string())),
        );
        self
    }

    /// Lowercase, trim and dedup every list; reject profiles that can never admit anything.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.experience_phrases = clean_list(self.experience_phrases);
        self.keywords = clean_list(self.keywords);
        self.aliases = self
            .aliases
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), clean_list(v)))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        if self.keywords.is_empty() {
            return Err(ConfigError::InvalidProfile("keyword list is empty".into()));
        }
        if self.min_keyword_matches == 0 {
            return Err(ConfigError::InvalidProfile(
                "min_keyword_matches must be at least 1".into(),
            ));
        }
        if self.min_keyword_matches > self.keywords.len() {
            return Err(ConfigError::InvalidProfile(format!(
                "min_keyword_matches={} exceeds {} configured keywords",
                self.min_keyword_matches,
                self.keywords.len()
            )));
        }
        Ok(self)
    }

    /// Profile from comma-separated env lists (`EXPERIENCE_LEVELS`, `JOB_KEYWORDS`,
    /// `MIN_KEYWORD_MATCHES`), falling back to the defaults per field.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut p = Self::default();
        if let Some(v) = lookup("EXPERIENCE_LEVELS") {
            p.experience_phrases = split_list(&v);
        }
        if let Some(v) = lookup("JOB_KEYWORDS") {
            p.keywords = split_list(&v);
        }
        if let Some(v) = lookup("MIN_KEYWORD_MATCHES") {
            p.min_keyword_matches = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "MIN_KEYWORD_MATCHES",
                value: v.clone(),
            })?;
        }
        p.normalized()
    }
}

/// Load a profile from an explicit path. Supports TOML or JSON formats.
pub fn load_profile_from(path: &Path) -> Result<FilterProfile, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ProfileIo {
        path: path.display().to_string(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_profile(&content, ext.as_str())
        .map_err(|message| ConfigError::ProfileParse {
            path: path.display().to_string(),
            message,
        })?
        .normalized()
}

/// Resolve the profile file path: `$JOB_PROFILE_PATH`, then `config/profile.toml`,
/// then `config/profile.json`. `Ok(None)` when none exists.
pub fn resolve_profile_path() -> Result<Option<PathBuf>, ConfigError> {
    if let Ok(p) = std::env::var(ENV_PROFILE_PATH) {
        let pb = PathBuf::from(&p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(ConfigError::Invalid {
            key: ENV_PROFILE_PATH,
            value: p,
        });
    }
    for candidate in [DEFAULT_PROFILE_PATH, FALLBACK_JSON_PATH] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

/// Load the profile using the file fallbacks, else the env lists, else defaults.
pub fn load_profile_default() -> Result<FilterProfile, ConfigError> {
    match resolve_profile_path()? {
        Some(path) => load_profile_from(&path),
        None => FilterProfile::from_lookup(|k| std::env::var(k).ok()),
    }
}

fn parse_profile(s: &str, hint_ext: &str) -> Result<FilterProfile, String> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str::<FilterProfile>(s) {
        Ok(p) => Ok(p),
        Err(toml_err) => {
            // Unknown extension: give JSON a chance before reporting the TOML error.
            if hint_ext != "toml" {
                if let Ok(p) = serde_json::from_str(s) {
                    return Ok(p);
                }
            }
            Err(toml_err.to_string())
        }
    }
}

/// Split a comma-separated env value into a clean ordered list.
pub fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(|s| s.to_string()))
}

/// Trim + lowercase, drop empties, dedup while keeping first-seen order.
fn clean_list<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && seen.insert(t.clone()) {
            out.push(t);
        }
    }
    out
}
