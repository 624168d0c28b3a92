// src/error.rs
//! Typed errors for the layers where callers branch on the failure kind.
//! Provider fetch/parse failures stay `anyhow` (they are only logged and counted).

use thiserror::Error;

/// Startup-only configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read profile {path}: {source}")]
    ProfileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile {path}: {message}")]
    ProfileParse { path: String, message: String },

    #[error("invalid filter profile: {0}")]
    InvalidProfile(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row for {identity}: {message}")]
    Corrupt { identity: String, message: String },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request to {channel} failed: {source}")]
    Transport {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} returned HTTP {status}: {body}")]
    Status {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("{channel} rejected message: {description}")]
    Rejected {
        channel: &'static str,
        description: String,
    },
}
