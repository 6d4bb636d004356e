// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for pipetrace.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.pipetrace/config.json
//! - Workspace config: pipetrace.json, pipetrace.yaml, or .pipetrace/config.json
//! - Environment: LANGFUSE_SECRET_KEY, LANGFUSE_PUBLIC_KEY, LANGFUSE_HOST,
//!   USE_MODEL_NAME, DEBUG_MODE
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > env > workspace > global > defaults).
//! Loading is cheap and can be repeated at any time; the Langfuse filter
//! accepts a fresh config through `on_config_updated`.

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, get_global_config_path, load_config_file, load_global_config,
    load_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{
    default_config, merge_config, CliOptions, EnvOverrides, ENV_DEBUG_MODE, ENV_HOST,
    ENV_PUBLIC_KEY, ENV_SECRET_KEY, ENV_USE_MODEL_NAME,
};

pub use types::{
    mask_secret, LangfuseConfig, LangfuseConfigPartial, PipelineConfigFile, ResolvedConfig,
    TurnLimitConfig, TurnLimitConfigPartial, DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_LANGFUSE_HOST,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources.
///
/// This is the main entry point for configuration loading.
pub fn load_config(dir: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(dir)?;

    Ok(merge_config(global, workspace, EnvOverrides::from_env(), cli_options))
}

/// Validate a resolved configuration.
pub fn validate_config(config: &ResolvedConfig) -> Result<(), ConfigError> {
    let host = config.langfuse.host.trim();
    if !(host.starts_with("http://") || host.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: "langfuse.host".to_string(),
            message: format!("expected an http(s) URL, got '{}'", host),
        });
    }
    if config.langfuse.backend_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "langfuse.backendTimeoutMs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.langfuse.flush_at == 0 {
        return Err(ConfigError::InvalidValue {
            field: "langfuse.flushAt".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
