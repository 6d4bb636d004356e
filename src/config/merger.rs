// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use super::types::{
    LangfuseConfig, LangfuseConfigPartial, PipelineConfigFile, ResolvedConfig, TurnLimitConfig,
    TurnLimitConfigPartial,
};

/// Environment variable holding the Langfuse secret key.
pub const ENV_SECRET_KEY: &str = "LANGFUSE_SECRET_KEY";
/// Environment variable holding the Langfuse public key.
pub const ENV_PUBLIC_KEY: &str = "LANGFUSE_PUBLIC_KEY";
/// Environment variable holding the Langfuse host.
pub const ENV_HOST: &str = "LANGFUSE_HOST";
/// Environment variable toggling model-name reporting.
pub const ENV_USE_MODEL_NAME: &str = "USE_MODEL_NAME";
/// Environment variable toggling debug logging.
pub const ENV_DEBUG_MODE: &str = "DEBUG_MODE";

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub host: Option<String>,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub insert_tags: Option<bool>,
    pub prefer_model_name: Option<bool>,
    pub debug: Option<bool>,
    pub max_turns: Option<usize>,
}

/// Overrides read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub secret_key: Option<String>,
    pub public_key: Option<String>,
    pub host: Option<String>,
    pub prefer_model_name: Option<bool>,
    pub debug: Option<bool>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            secret_key: non_empty(ENV_SECRET_KEY),
            public_key: non_empty(ENV_PUBLIC_KEY),
            host: non_empty(ENV_HOST),
            prefer_model_name: non_empty(ENV_USE_MODEL_NAME).map(|v| parse_flag(&v)),
            debug: non_empty(ENV_DEBUG_MODE).map(|v| parse_flag(&v)),
        }
    }
}

/// Only a case-insensitive `true` enables a flag.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Environment variables
/// 3. Workspace config (pipetrace.json)
/// 4. Global config (~/.pipetrace/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<PipelineConfigFile>,
    workspace: Option<PipelineConfigFile>,
    env: EnvOverrides,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for file in [global, workspace].into_iter().flatten() {
        apply_file(&mut result, &file);
    }

    apply_env(&mut result.langfuse, &env);
    apply_cli_options(&mut result, &cli);

    result
}

fn apply_file(result: &mut ResolvedConfig, file: &PipelineConfigFile) {
    if let Some(ref langfuse) = file.langfuse {
        apply_langfuse(&mut result.langfuse, langfuse);
    }
    if let Some(ref turn_limit) = file.turn_limit {
        apply_turn_limit(&mut result.turn_limit, turn_limit);
    }
}

fn apply_langfuse(result: &mut LangfuseConfig, config: &LangfuseConfigPartial) {
    if let Some(ref pipelines) = config.pipelines {
        result.pipelines = pipelines.clone();
    }
    if let Some(priority) = config.priority {
        result.priority = priority;
    }
    if let Some(ref secret_key) = config.secret_key {
        result.secret_key = secret_key.clone();
    }
    if let Some(ref public_key) = config.public_key {
        result.public_key = public_key.clone();
    }
    if let Some(ref host) = config.host {
        result.host = host.clone();
    }
    if let Some(insert_tags) = config.insert_tags {
        result.insert_tags = insert_tags;
    }
    if let Some(prefer) = config.use_model_name_instead_of_id_for_generation {
        result.prefer_model_name = prefer;
    }
    if let Some(debug) = config.debug {
        result.debug = debug;
    }
    if let Some(timeout) = config.backend_timeout_ms {
        result.backend_timeout_ms = timeout;
    }
    if config.session_idle_ttl_secs.is_some() {
        result.session_idle_ttl_secs = config.session_idle_ttl_secs;
    }
    if let Some(flush_at) = config.flush_at {
        result.flush_at = flush_at;
    }
}

fn apply_turn_limit(result: &mut TurnLimitConfig, config: &TurnLimitConfigPartial) {
    if let Some(ref pipelines) = config.pipelines {
        result.pipelines = pipelines.clone();
    }
    if let Some(priority) = config.priority {
        result.priority = priority;
    }
    if let Some(max_turns) = config.max_turns {
        result.max_turns = max_turns;
    }
    if let Some(ref roles) = config.target_user_roles {
        result.target_user_roles = roles.clone();
    }
}

fn apply_env(result: &mut LangfuseConfig, env: &EnvOverrides) {
    if let Some(ref secret_key) = env.secret_key {
        result.secret_key = secret_key.clone();
    }
    if let Some(ref public_key) = env.public_key {
        result.public_key = public_key.clone();
    }
    if let Some(ref host) = env.host {
        result.host = host.clone();
    }
    if let Some(prefer) = env.prefer_model_name {
        result.prefer_model_name = prefer;
    }
    if let Some(debug) = env.debug {
        result.debug = debug;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref host) = cli.host {
        result.langfuse.host = host.clone();
    }
    if let Some(ref public_key) = cli.public_key {
        result.langfuse.public_key = public_key.clone();
    }
    if let Some(ref secret_key) = cli.secret_key {
        result.langfuse.secret_key = secret_key.clone();
    }
    if let Some(insert_tags) = cli.insert_tags {
        result.langfuse.insert_tags = insert_tags;
    }
    if let Some(prefer) = cli.prefer_model_name {
        result.langfuse.prefer_model_name = prefer;
    }
    if let Some(debug) = cli.debug {
        result.langfuse.debug = debug;
    }
    if let Some(max_turns) = cli.max_turns {
        result.turn_limit.max_turns = max_turns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn file_with_host(host: &str) -> PipelineConfigFile {
        PipelineConfigFile {
            langfuse: Some(LangfuseConfigPartial {
                host: Some(host.to_string()),
                ..Default::default()
            }),
            turn_limit: None,
        }
    }

    #[test]
    fn test_merge_defaults_only() {
        let config = merge_config(None, None, EnvOverrides::default(), CliOptions::default());
        assert_eq!(config, ResolvedConfig::default());
    }

    #[test]
    fn test_workspace_overrides_global() {
        let config = merge_config(
            Some(file_with_host("http://global")),
            Some(file_with_host("http://workspace")),
            EnvOverrides::default(),
            CliOptions::default(),
        );
        assert_eq!(config.langfuse.host, "http://workspace");
    }

    #[test]
    fn test_env_overrides_files_and_cli_overrides_env() {
        let env = EnvOverrides {
            host: Some("http://env".to_string()),
            debug: Some(true),
            ..Default::default()
        };
        let config = merge_config(
            None,
            Some(file_with_host("http://workspace")),
            env.clone(),
            CliOptions::default(),
        );
        assert_eq!(config.langfuse.host, "http://env");
        assert!(config.langfuse.debug);

        let cli = CliOptions {
            host: Some("http://cli".to_string()),
            debug: Some(false),
            ..Default::default()
        };
        let config = merge_config(None, Some(file_with_host("http://workspace")), env, cli);
        assert_eq!(config.langfuse.host, "http://cli");
        assert!(!config.langfuse.debug);
    }

    #[test]
    fn test_turn_limit_merge() {
        let file = PipelineConfigFile {
            langfuse: None,
            turn_limit: Some(TurnLimitConfigPartial {
                max_turns: Some(3),
                target_user_roles: Some(vec!["user".to_string()]),
                ..Default::default()
            }),
        };
        let config = merge_config(None, Some(file), EnvOverrides::default(), CliOptions::default());
        assert_eq!(config.turn_limit.max_turns, 3);
        assert_eq!(config.turn_limit.target_user_roles, vec!["user"]);
        assert_eq!(config.turn_limit.priority, 2);
    }

    #[test]
    fn test_env_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_SECRET_KEY, "sk-lf-1"),
            (ENV_PUBLIC_KEY, "pk-lf-1"),
            (ENV_HOST, ""),
            (ENV_USE_MODEL_NAME, "TRUE"),
            (ENV_DEBUG_MODE, "yes"),
        ]
        .into_iter()
        .collect();

        let env = EnvOverrides::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(env.secret_key.as_deref(), Some("sk-lf-1"));
        assert_eq!(env.public_key.as_deref(), Some("pk-lf-1"));
        assert_eq!(env.host, None);
        assert_eq!(env.prefer_model_name, Some(true));
        assert_eq!(env.debug, Some(false));
    }
}
