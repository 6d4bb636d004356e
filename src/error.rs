// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for pipetrace.
//!
//! Two tiers matter here. [`FilterError`] is what a filter hook may hand back
//! to the host; [`TelemetryError`] describes a failed backend call and is
//! always contained by the lifecycle manager.

use thiserror::Error;

/// Errors a filter hook is allowed to surface to the host runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Missing keys in the request body: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("Conversation limit exceeded ({max_turns} turns max)")]
    TurnLimitExceeded { max_turns: usize },
}

impl FilterError {
    /// Create a missing-keys error from borrowed key names.
    pub fn missing_keys(keys: &[&str]) -> Self {
        Self::MissingKeys(keys.iter().map(|k| k.to_string()).collect())
    }
}

/// Errors that can occur while talking to the observability backend.
#[derive(Error, Debug, Clone)]
pub enum TelemetryError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Backend rejected {count} of {total} events")]
    Rejected { count: usize, total: usize },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl TelemetryError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Map an HTTP status to the matching error kind.
    pub fn from_status(status_code: u16, body: &str) -> Self {
        match status_code {
            401 | 403 => Self::Auth(format!("HTTP {}: {}", status_code, body)),
            _ => Self::api(body.to_string(), status_code),
        }
    }

    /// Check if this error means the credentials are unusable.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Stable label for the variant, used to group failures in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Api { .. } => "api",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Rejected { .. } => "rejected",
            Self::Timeout(_) => "timeout",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
