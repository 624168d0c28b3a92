// src/config/mod.rs
//! Startup configuration. Everything is read once from the environment (after
//! `dotenvy` loads `.env`); nothing in the pipeline reads env vars mid-run.

pub mod profile;

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::freshness::FreshnessWindow;
pub use profile::FilterProfile;
use profile::split_list;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://jobs.db?mode=rwc";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_SEARCH_KEYWORDS: &str = "devops engineer,sre,cloud engineer,devsecops";
pub const DEFAULT_SEARCH_LOCATIONS: &str = "Israel,Tel Aviv,Jerusalem,Haifa,Remote";
pub const DEFAULT_RSS_FEED_TEMPLATE: &str =
    "https://www.indeed.com/rss?q={keyword}&l={location}&sort=date";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` only in dry-run mode; `from_env` requires it.
    pub telegram: Option<TelegramConfig>,
    pub serpapi_key: Option<String>,
    pub database_url: String,
    pub search_keywords: Vec<String>,
    pub search_locations: Vec<String>,
    pub rss_feed_template: Option<String>,
    pub freshness: FreshnessWindow,
    pub webhook_secret: Option<String>,
    pub profile: FilterProfile,
    pub profile_path: Option<PathBuf>,
}

impl AppConfig {
    /// Full service config. Missing Telegram credentials are fatal here.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile_path = profile::resolve_profile_path()?;
        let profile = match &profile_path {
            Some(p) => profile::load_profile_from(p)?,
            None => FilterProfile::from_lookup(|k| std::env::var(k).ok())?,
        };
        let mut cfg = Self::from_lookup(|k| std::env::var(k).ok(), true)?;
        cfg.profile = profile;
        cfg.profile_path = profile_path;
        Ok(cfg)
    }

    /// Same as `from_env` but Telegram credentials are optional (dry runs).
    pub fn from_env_dry_run() -> Result<Self, ConfigError> {
        let profile = profile::load_profile_default()?;
        let mut cfg = Self::from_lookup(|k| std::env::var(k).ok(), false)?;
        cfg.profile = profile;
        Ok(cfg)
    }

    /// Build from an arbitrary key lookup. The profile comes from the env-list keys;
    /// `from_env` replaces it with the file profile when one exists.
    pub fn from_lookup<F>(lookup: F, require_telegram: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id,
                api_base: get("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            }),
            (None, _) if require_telegram => return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN")),
            (_, None) if require_telegram => return Err(ConfigError::Missing("TELEGRAM_CHAT_ID")),
            _ => None,
        };

        let freshness = match get("FRESHNESS_DAYS") {
            None => FreshnessWindow::default(),
            Some(raw) => {
                let days: u32 = raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "FRESHNESS_DAYS",
                    value: raw.clone(),
                })?;
                FreshnessWindow::from_days(days)
            }
        };

        let search_keywords =
            split_list(&get("SEARCH_KEYWORDS").unwrap_or_else(|| DEFAULT_SEARCH_KEYWORDS.into()));
        if search_keywords.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SEARCH_KEYWORDS",
                value: String::new(),
            });
        }
        // Locations keep their casing; they end up in query strings.
        let search_locations: Vec<String> = get("SEARCH_LOCATIONS")
            .unwrap_or_else(|| DEFAULT_SEARCH_LOCATIONS.into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let rss_feed_template = match get("RSS_FEED_TEMPLATE").as_deref() {
            Some("off") | Some("none") => None,
            Some(t) => Some(t.to_string()),
            None => Some(DEFAULT_RSS_FEED_TEMPLATE.to_string()),
        };

        Ok(Self {
            telegram,
            serpapi_key: get("SERPAPI_KEY"),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            search_keywords,
            search_locations,
            rss_feed_template,
            freshness,
            webhook_secret: get("WEBHOOK_SECRET"),
            profile: FilterProfile::from_lookup(&lookup)?,
            profile_path: None,
        })
    }
}
