// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in the global
//! config directory and the working directory.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::PipelineConfigFile;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &["pipetrace.json", "pipetrace.yaml", ".pipetrace/config.json"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".pipetrace";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.pipetrace/config.json.
pub fn load_global_config() -> Result<Option<PipelineConfigFile>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from `dir`.
///
/// Searches for config files in the following order:
/// 1. pipetrace.json
/// 2. pipetrace.yaml
/// 3. .pipetrace/config.json
pub fn load_workspace_config(dir: &Path) -> Result<Option<PipelineConfigFile>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = dir.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<PipelineConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}
