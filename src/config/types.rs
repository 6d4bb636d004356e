// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! File-level types are all-optional partials so that several sources can be
//! layered; the resolved types carry concrete values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Langfuse host.
pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Default timeout for a single backend call.
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;

/// Default number of buffered events that triggers a flush.
pub const DEFAULT_FLUSH_AT: usize = 15;

/// Configuration file contents (`pipetrace.json` / `pipetrace.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigFile {
    /// Langfuse filter settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub langfuse: Option<LangfuseConfigPartial>,

    /// Turn limit filter settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_limit: Option<TurnLimitConfigPartial>,
}

/// Langfuse filter settings as they appear in a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LangfuseConfigPartial {
    /// Pipelines this filter attaches to (`*` for all)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<Vec<String>>,

    /// Ordering among filters (lower runs first)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Langfuse base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Attach origin/task tags to traces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_tags: Option<bool>,

    /// Report the human-readable model name on generations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_model_name_instead_of_id_for_generation: Option<bool>,

    /// Verbose logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    /// Per-call backend timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_timeout_ms: Option<u64>,

    /// End and forget sessions idle for this long (never, if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_idle_ttl_secs: Option<u64>,

    /// Flush once this many events are buffered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_at: Option<usize>,
}

/// Turn limit settings as they appear in a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnLimitConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_roles: Option<Vec<String>>,
}

/// Resolved Langfuse filter configuration.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LangfuseConfig {
    pub pipelines: Vec<String>,
    pub priority: i32,
    pub secret_key: String,
    pub public_key: String,
    pub host: String,
    pub insert_tags: bool,
    pub prefer_model_name: bool,
    pub debug: bool,
    pub backend_timeout_ms: u64,
    pub session_idle_ttl_secs: Option<u64>,
    pub flush_at: usize,
}

impl Default for LangfuseConfig {
    fn default() -> Self {
        Self {
            pipelines: vec!["*".to_string()],
            priority: 0,
            secret_key: String::new(),
            public_key: String::new(),
            host: DEFAULT_LANGFUSE_HOST.to_string(),
            insert_tags: true,
            prefer_model_name: false,
            debug: false,
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            session_idle_ttl_secs: None,
            flush_at: DEFAULT_FLUSH_AT,
        }
    }
}

impl LangfuseConfig {
    /// Create a config pointing at `host` with the given key pair.
    pub fn new(
        host: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            ..Self::default()
        }
    }

    pub fn has_secret_key(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }

    pub fn has_public_key(&self) -> bool {
        !self.public_key.trim().is_empty()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        self.session_idle_ttl_secs.map(Duration::from_secs)
    }

    /// A copy safe to print: key material replaced by a short fingerprint.
    pub fn redacted(&self) -> Self {
        Self {
            secret_key: mask_secret(&self.secret_key),
            public_key: mask_secret(&self.public_key),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for LangfuseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.redacted();
        f.debug_struct("LangfuseConfig")
            .field("pipelines", &redacted.pipelines)
            .field("priority", &redacted.priority)
            .field("secret_key", &redacted.secret_key)
            .field("public_key", &redacted.public_key)
            .field("host", &redacted.host)
            .field("insert_tags", &redacted.insert_tags)
            .field("prefer_model_name", &redacted.prefer_model_name)
            .field("debug", &redacted.debug)
            .field("backend_timeout_ms", &redacted.backend_timeout_ms)
            .field("session_idle_ttl_secs", &redacted.session_idle_ttl_secs)
            .field("flush_at", &redacted.flush_at)
            .finish()
    }
}

/// Resolved turn limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnLimitConfig {
    pub pipelines: Vec<String>,
    pub priority: i32,
    pub max_turns: usize,
    pub target_user_roles: Vec<String>,
}

impl Default for TurnLimitConfig {
    fn default() -> Self {
        Self {
            pipelines: vec!["*".to_string()],
            priority: 2,
            max_turns: 10,
            target_user_roles: vec!["user".to_string(), "admin".to_string()],
        }
    }
}

/// Fully resolved configuration for both filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub langfuse: LangfuseConfig,
    pub turn_limit: TurnLimitConfig,
}

impl ResolvedConfig {
    /// A copy safe to print.
    pub fn redacted(&self) -> Self {
        Self {
            langfuse: self.langfuse.redacted(),
            turn_limit: self.turn_limit.clone(),
        }
    }
}

/// Mask a secret, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
