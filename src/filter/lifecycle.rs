// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace lifecycle: what happens to a session's trace on each hook.
//!
//! Every transition for a session runs under that session's gate, so the
//! create-or-reuse decision and the backend calls it triggers are atomic per
//! session. Backend calls go through [`TraceLifecycleManager::guarded`],
//! which applies the timeout, records metrics and logs failures; the
//! transitions only branch on the returned `Result`.

use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use super::keys::{request_session_key, response_session_key};
use super::tags::{build_tags, TagSet};
use super::usage::extract_usage;
use crate::backend::{
    GenerationRequest, SpanRequest, TelemetryClient, TraceHandle, TraceRequest, TraceUpdate,
};
use crate::config::LangfuseConfig;
use crate::error::{FilterError, TelemetryError};
use crate::session::{SessionKey, SessionPatch, SessionRegistry};
use crate::telemetry::GLOBAL_METRICS;
use crate::types::{last_assistant_message, message_text, ChatBody, TaskType, UserInfo};

/// Interface label attached to every record.
pub const INTERFACE: &str = "open-webui";

/// Keys a request body must carry.
pub const REQUIRED_KEYS: [&str; 2] = ["model", "messages"];

/// Placeholder when no model name is known.
const UNKNOWN_MODEL: &str = "unknown";

/// Settings the lifecycle reads on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub insert_tags: bool,
    pub prefer_model_name: bool,
    pub backend_timeout: Duration,
    pub session_idle_ttl: Option<Duration>,
    /// Flush once the client holds this many undelivered records.
    pub flush_at: usize,
}

impl From<&LangfuseConfig> for LifecycleSettings {
    fn from(config: &LangfuseConfig) -> Self {
        Self {
            insert_tags: config.insert_tags,
            prefer_model_name: config.prefer_model_name,
            backend_timeout: config.backend_timeout(),
            session_idle_ttl: config.session_idle_ttl(),
            flush_at: config.flush_at,
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&LangfuseConfig::default())
    }
}

/// Outcome of ending every trace at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Traces ended successfully.
    pub ended: usize,
    /// Sessions whose trace could not be ended.
    pub failed: Vec<SessionKey>,
    /// Whether the final flush succeeded.
    pub flushed: bool,
}

/// Model identity as reported on a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportedModel {
    id: Option<String>,
    name: String,
    reported: Option<String>,
}

/// Check that a request body has every required key.
///
/// Missing keys are reported in the order of [`REQUIRED_KEYS`].
pub fn validate_request(body: &ChatBody) -> Result<(), FilterError> {
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !body.contains_key(key))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(FilterError::missing_keys(&missing))
    }
}

/// Request metadata plus the identity fields every record carries.
fn trace_metadata(
    base: Option<&Map<String, Value>>,
    user_id: Option<&str>,
    key: &str,
) -> Map<String, Value> {
    let mut metadata = base.cloned().unwrap_or_default();
    metadata.insert("user_id".to_string(), json!(user_id));
    metadata.insert("session_id".to_string(), json!(key));
    metadata.insert("interface".to_string(), json!(INTERFACE));
    metadata
}

/// Model display name from `metadata.model.name`.
fn model_display_name(body: &ChatBody) -> Option<String> {
    body.metadata()
        .and_then(|m| m.get("model"))
        .and_then(Value::as_object)
        .and_then(|model| model.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Drives session traces through their lifecycle.
#[derive(Debug, Default)]
pub struct TraceLifecycleManager {
    registry: SessionRegistry,
    settings: RwLock<LifecycleSettings>,
}

impl TraceLifecycleManager {
    pub fn new(settings: LifecycleSettings) -> Self {
        Self {
            registry: SessionRegistry::new(),
            settings: RwLock::new(settings),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> LifecycleSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_settings(&self, settings: LifecycleSettings) {
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Pre-request transition.
    ///
    /// Returns the body with `metadata.chat_id`, `metadata.type` and
    /// `metadata.interface` filled in. Only a malformed body is an error;
    /// backend failures are logged and the body is still returned.
    ///
    /// Records are flushed here only once the client's buffer reaches
    /// `flush_at`; otherwise they go out with the response.
    pub async fn on_request(
        &self,
        client: &dyn TelemetryClient,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        let key = request_session_key(&body);
        self.evict_idle(client).await;

        let gate = self.registry.lock(&key).await;
        let result = self.register_request(client, body, user, &key).await;
        drop(gate);

        self.flush_if_due(client, &key).await;
        result
    }

    /// Post-response transition. Never fails.
    ///
    /// A response for a session without a trace is recorded as a request
    /// first, and the result of that is returned instead.
    pub async fn on_response(
        &self,
        client: &dyn TelemetryClient,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> ChatBody {
        let key = response_session_key(&body);
        self.evict_idle(client).await;

        let gate = self.registry.lock(&key).await;
        Span::current().record("session", key.as_str());

        let Some(record) = self.registry.resolve(&key) else {
            warn!(session = %key, "No trace for session, registering the request first");
            let registered = self.register_request(client, body.clone(), user, &key).await;
            drop(gate);
            self.flush_if_due(client, &key).await;

            return match registered {
                Ok(body) => body,
                Err(e) => {
                    warn!(session = %key, error = %e, "Could not register session from response");
                    body
                }
            };
        };

        let settings = self.settings();
        let user_id = user.and_then(|u| u.email.as_deref());
        let messages = body.messages();
        let assistant = last_assistant_message(messages);
        let output = assistant.map(message_text).unwrap_or_default();
        let usage = assistant.and_then(extract_usage);

        let task = TaskType::from_metadata(body.metadata(), TaskType::LlmResponse);
        let tags = build_tags(&task, settings.insert_tags);

        let mut metadata = trace_metadata(body.metadata(), user_id, &key);
        metadata.insert("type".to_string(), json!(task.as_str()));
        metadata.insert("task".to_string(), json!(task.as_str()));

        let update = TraceUpdate {
            output: Some(json!(output)),
            metadata: Some(metadata.clone()),
            tags: tags.into_option(),
            ..Default::default()
        };
        self.guarded(client, "update_trace", &key, client.update_trace(&record.trace, update))
            .await
            .ok();

        let model = self.resolve_model(&key, &body, settings.prefer_model_name);
        let generation_id = Uuid::new_v4().to_string();
        let mut generation_metadata = metadata;
        generation_metadata.insert("type".to_string(), json!(TaskType::LLM_RESPONSE));
        generation_metadata.insert("model_id".to_string(), json!(model.id));
        generation_metadata.insert("model_name".to_string(), json!(model.name));
        generation_metadata.insert("generation_id".to_string(), json!(generation_id));

        let request = GenerationRequest {
            name: format!("llm_response:{}", generation_id),
            model: model.reported,
            input: Value::Array(messages.to_vec()),
            output: json!(output),
            metadata: generation_metadata,
        };

        let created = self
            .guarded(client, "create_generation", &key, client.create_generation(&record.trace, request))
            .await;
        if let Ok(generation) = created {
            self.registry.upsert(&key, SessionPatch::span_opened());

            let mut recorded_usage = None;
            if let Some(usage) = usage {
                let attached = self
                    .guarded(client, "attach_usage", &key, client.attach_usage(&generation, usage))
                    .await;
                recorded_usage = attached.ok().map(|()| usage);
            }
            GLOBAL_METRICS.record_generation(recorded_usage);

            self.guarded(client, "end_generation", &key, client.end_generation(&generation))
                .await
                .ok();
            debug!(session = %key, generation_id = %generation.id, usage = ?usage, "Recorded generation");
        }

        drop(gate);
        self.guarded(client, "flush", &key, client.flush()).await.ok();
        body
    }

    /// Shutdown transition: end every live trace once, then flush.
    pub async fn shutdown(&self, client: &dyn TelemetryClient) -> ShutdownReport {
        let sessions = self.registry.drain();
        info!(sessions = sessions.len(), "Ending session traces");

        let mut report = ShutdownReport::default();
        for (key, record) in sessions {
            let result = self
                .guarded(client, "end_trace", &key, client.end_trace(&record.trace))
                .await;
            match result {
                Ok(()) => report.ended += 1,
                Err(_) => report.failed.push(key),
            }
        }

        report.flushed = self.guarded(client, "flush", "*", client.flush()).await.is_ok();
        report
    }

    /// Record a request for `key`. The caller holds the session gate.
    async fn register_request(
        &self,
        client: &dyn TelemetryClient,
        mut body: ChatBody,
        user: Option<&UserInfo>,
        key: &str,
    ) -> Result<ChatBody, FilterError> {
        Span::current().record("session", key);
        body.metadata_mut()
            .insert("chat_id".to_string(), json!(key));

        validate_request(&body)?;

        self.registry.upsert(
            key,
            SessionPatch::model(body.model().map(str::to_string), model_display_name(&body)),
        );

        let settings = self.settings();
        let user_id = user.and_then(|u| u.email.as_deref());
        let task = TaskType::from_metadata(body.metadata(), TaskType::UserResponse);
        let tags = build_tags(&task, settings.insert_tags);
        let metadata = trace_metadata(body.metadata(), user_id, key);

        let trace = match self.registry.resolve(key) {
            Some(record) => {
                let update = TraceUpdate {
                    metadata: Some(metadata),
                    tags: tags.into_option(),
                    ..Default::default()
                };
                self.guarded(client, "update_trace", key, client.update_trace(&record.trace, update))
                    .await
                    .ok();
                record.trace
            }
            None => match self.open_trace(client, &body, user_id, key, tags, metadata).await {
                Some(trace) => trace,
                None => return Ok(body),
            },
        };

        let metadata = body.metadata_mut();
        metadata.insert("type".to_string(), json!(task.as_str()));
        metadata.insert("interface".to_string(), json!(INTERFACE));

        self.record_user_input(client, &trace, &body, user_id, key).await;
        Ok(body)
    }

    async fn open_trace(
        &self,
        client: &dyn TelemetryClient,
        body: &ChatBody,
        user_id: Option<&str>,
        key: &str,
        tags: TagSet,
        metadata: Map<String, Value>,
    ) -> Option<TraceHandle> {
        let input = Value::Object(body.as_map().clone());
        let request = TraceRequest {
            name: format!("chat:{}", key),
            input: input.clone(),
            metadata: metadata.clone(),
        };
        let trace = self
            .guarded(client, "create_trace", key, client.create_trace(request))
            .await
            .ok()?;

        let update = TraceUpdate {
            user_id: user_id.map(str::to_string),
            session_id: Some(key.to_string()),
            input: Some(input),
            output: None,
            metadata: Some(metadata),
            tags: tags.into_option(),
        };
        self.guarded(client, "update_trace", key, client.update_trace(&trace, update))
            .await
            .ok();

        self.registry.upsert(key, SessionPatch::trace(trace.clone()));
        info!(session = %key, trace_id = %trace.trace_id, "Created trace");
        Some(trace)
    }

    async fn record_user_input(
        &self,
        client: &dyn TelemetryClient,
        trace: &TraceHandle,
        body: &ChatBody,
        user_id: Option<&str>,
        key: &str,
    ) {
        let event_id = Uuid::new_v4().to_string();
        let mut metadata = body.metadata().cloned().unwrap_or_default();
        metadata.insert("type".to_string(), json!("user_input"));
        metadata.insert("interface".to_string(), json!(INTERFACE));
        metadata.insert("user_id".to_string(), json!(user_id));
        metadata.insert("session_id".to_string(), json!(key));
        metadata.insert("event_id".to_string(), json!(event_id));

        let request = SpanRequest {
            name: format!("user_input:{}", event_id),
            input: Some(Value::Array(body.messages().to_vec())),
            metadata: Some(metadata),
        };

        let Ok(span) = self
            .guarded(client, "create_span", key, client.create_span(trace, request))
            .await
        else {
            return;
        };
        self.registry.upsert(key, SessionPatch::span_opened());
        self.guarded(client, "end_span", key, client.end_span(&span))
            .await
            .ok();
        debug!(session = %key, span_id = %span.id, "Recorded user input");
    }

    fn resolve_model(&self, key: &str, body: &ChatBody, prefer_name: bool) -> ReportedModel {
        let cached = self.registry.model_identity(key).unwrap_or_default();
        let id = cached.id.or_else(|| body.model().map(str::to_string));
        let reported = match cached.name {
            Some(ref name) if prefer_name => Some(name.clone()),
            _ => id.clone(),
        };

        ReportedModel {
            id,
            name: cached.name.unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            reported,
        }
    }

    async fn flush_if_due(&self, client: &dyn TelemetryClient, key: &str) {
        let pending = client.pending();
        if pending < self.settings().flush_at {
            return;
        }

        debug!(session = %key, pending, "Buffer full, flushing");
        self.guarded(client, "flush", key, client.flush()).await.ok();
    }

    async fn evict_idle(&self, client: &dyn TelemetryClient) {
        let Some(ttl) = self.settings().session_idle_ttl else {
            return;
        };

        for (key, record) in self.registry.evict_idle(ttl) {
            info!(session = %key, "Evicting idle session");
            self.guarded(client, "end_trace", &key, client.end_trace(&record.trace))
                .await
                .ok();
        }
    }

    /// Run one backend call with the configured timeout.
    ///
    /// The call is recorded in the global metrics; a failure is logged and
    /// handed back to the caller.
    async fn guarded<T, F>(
        &self,
        client: &dyn TelemetryClient,
        operation: &str,
        key: &str,
        call: F,
    ) -> Result<T, TelemetryError>
    where
        F: Future<Output = Result<T, TelemetryError>>,
    {
        let timeout = self.settings().backend_timeout;
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(timeout.as_millis() as u64)),
        };

        GLOBAL_METRICS.record_backend(
            &format!("{}.{}", client.name(), operation),
            start.elapsed(),
            result.as_ref().err(),
        );
        if let Err(ref e) = result {
            warn!(
                backend = client.name(),
                operation = operation,
                session = %key,
                error = %e,
                "Backend call failed"
            );
        }
        result
    }
}
