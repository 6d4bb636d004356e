// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Langfuse filter: the host-facing hooks around the trace lifecycle.

use std::sync::{Arc, PoisonError, RwLock as SyncRwLock};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn, Instrument};

use super::lifecycle::{LifecycleSettings, ShutdownReport, TraceLifecycleManager};
use crate::backend::{LangfuseClient, SharedTelemetryClient};
use crate::config::LangfuseConfig;
use crate::error::FilterError;
use crate::pipeline::{pipeline_matches, Filter};
use crate::telemetry::HookSpan;
use crate::types::{ChatBody, UserInfo};

/// Records chat sessions as Langfuse traces.
///
/// Without a working client (missing keys, failed authentication) both
/// hooks pass bodies through untouched.
pub struct LangfuseFilter {
    /// Read synchronously by `priority` and `applies_to`; never held across an await.
    config: SyncRwLock<LangfuseConfig>,
    client: RwLock<Option<SharedTelemetryClient>>,
    lifecycle: TraceLifecycleManager,
}

impl LangfuseFilter {
    pub const NAME: &'static str = "Langfuse Filter";

    /// Create a filter. No client is connected until [`Filter::on_startup`].
    pub fn new(config: LangfuseConfig) -> Self {
        Self {
            lifecycle: TraceLifecycleManager::new(LifecycleSettings::from(&config)),
            config: SyncRwLock::new(config),
            client: RwLock::new(None),
        }
    }

    /// Create a filter backed by `client`, authenticating it first.
    pub async fn with_client(config: LangfuseConfig, client: SharedTelemetryClient) -> Self {
        let filter = Self::new(config);
        filter.connect(client).await;
        filter
    }

    /// Authenticate `client` and use it if that succeeds.
    ///
    /// On failure the filter is left without a client.
    pub async fn connect(&self, client: SharedTelemetryClient) -> bool {
        let connected = match client.authenticate().await {
            Ok(()) => {
                info!(backend = client.name(), "Telemetry client authenticated");
                Some(client)
            }
            Err(e) if e.is_auth() => {
                error!(backend = client.name(), error = %e, "Telemetry credentials rejected");
                None
            }
            Err(e) => {
                error!(backend = client.name(), error = %e, "Telemetry client unavailable");
                None
            }
        };

        let enabled = connected.is_some();
        *self.client.write().await = connected;
        enabled
    }

    /// Whether a client is connected.
    pub async fn is_enabled(&self) -> bool {
        self.client.read().await.is_some()
    }

    pub fn config(&self) -> LangfuseConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lifecycle(&self) -> &TraceLifecycleManager {
        &self.lifecycle
    }

    /// Replace the configuration and reconnect.
    ///
    /// Priority and pipeline scope take effect on the next pipeline run.
    pub async fn on_config_updated(&self, config: LangfuseConfig) {
        info!(priority = config.priority, pipelines = ?config.pipelines, "Langfuse configuration updated");
        self.lifecycle.set_settings(LifecycleSettings::from(&config));
        *self
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        self.init_client().await;
    }

    /// End every open trace and flush. Returns `None` without a client.
    pub async fn close_sessions(&self) -> Option<ShutdownReport> {
        let client = self.client().await?;
        let report = self.lifecycle.shutdown(client.as_ref()).await;
        info!(
            ended = report.ended,
            failed = report.failed.len(),
            flushed = report.flushed,
            "Closed session traces"
        );
        Some(report)
    }

    async fn client(&self) -> Option<SharedTelemetryClient> {
        self.client.read().await.clone()
    }

    async fn init_client(&self) {
        let config = self.config();
        debug!(
            host = %config.host,
            secret_key_set = config.has_secret_key(),
            public_key_set = config.has_public_key(),
            "Initializing Langfuse client"
        );

        match LangfuseClient::new(&config) {
            Ok(client) => {
                self.connect(Arc::new(client)).await;
            }
            Err(e) => {
                warn!(error = %e, "Langfuse client disabled");
                *self.client.write().await = None;
            }
        }
    }
}

impl std::fmt::Debug for LangfuseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config();
        f.debug_struct("LangfuseFilter")
            .field("priority", &config.priority)
            .field("pipelines", &config.pipelines)
            .field("sessions", &self.lifecycle.registry().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Filter for LangfuseFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .priority
    }

    fn applies_to(&self, model: Option<&str>) -> bool {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        pipeline_matches(&config.pipelines, model)
    }

    async fn on_startup(&self) {
        info!(filter = Self::NAME, "Starting");
        self.init_client().await;
    }

    async fn on_shutdown(&self) {
        info!(filter = Self::NAME, "Shutting down");
        self.close_sessions().await;
    }

    async fn inlet(
        &self,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        let span = HookSpan::start("langfuse", "inlet");
        let Some(client) = self.client().await else {
            warn!("Langfuse client not initialized, skipping inlet");
            return Ok(body);
        };
        debug!(body = ?body, user = ?user, "Inlet called");

        let result = self
            .lifecycle
            .on_request(client.as_ref(), body, user)
            .instrument(span.span().clone())
            .await;
        span.finish(&result);
        result
    }

    async fn outlet(
        &self,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        let span = HookSpan::start("langfuse", "outlet");
        let Some(client) = self.client().await else {
            warn!("Langfuse client not initialized, skipping outlet");
            return Ok(body);
        };
        debug!(body = ?body, user = ?user, "Outlet called");

        let body = self
            .lifecycle
            .on_response(client.as_ref(), body, user)
            .instrument(span.span().clone())
            .await;
        let result: Result<ChatBody, FilterError> = Ok(body);
        span.finish(&result);
        result
    }
}
