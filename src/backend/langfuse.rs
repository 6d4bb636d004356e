// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Langfuse ingestion client.
//!
//! Records are queued locally as ingestion events and delivered in one batch
//! per [`flush`](TelemetryClient::flush) to `POST /api/public/ingestion`.
//! Langfuse upserts by id, so updates are just further events for the same
//! trace or observation.
//!
//! # API Reference
//!
//! See [Langfuse Public API](https://api.reference.langfuse.com)

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::LangfuseConfig;
use crate::error::TelemetryError;
use crate::types::UsageRecord;

use super::{
    GenerationHandle, GenerationRequest, SpanHandle, SpanRequest, TelemetryClient, TraceHandle,
    TraceRequest, TraceUpdate,
};

/// Path used to verify credentials.
const AUTH_CHECK_PATH: &str = "/api/public/projects";

/// Batch ingestion path.
const INGESTION_PATH: &str = "/api/public/ingestion";

/// Kind of an ingestion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TraceCreate,
    SpanCreate,
    SpanUpdate,
    GenerationCreate,
    GenerationUpdate,
}

/// One queued ingestion event.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub body: Value,
}

impl IngestionEvent {
    fn new(kind: EventKind, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now(),
            kind,
            body,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    errors: Vec<IngestionError>,
}

#[derive(Debug, Deserialize)]
struct IngestionError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Insert `value` under `key` only when present.
fn put<T: Serialize>(body: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        body.insert(key.to_string(), json!(value));
    }
}

/// Buffered Langfuse client.
pub struct LangfuseClient {
    client: Client,
    host: String,
    public_key: String,
    secret_key: String,
    buffer: Mutex<Vec<IngestionEvent>>,
}

impl LangfuseClient {
    /// Create a client from the filter configuration.
    ///
    /// Fails with [`TelemetryError::NotConfigured`] when either key is missing.
    pub fn new(config: &LangfuseConfig) -> Result<Self, TelemetryError> {
        if !config.has_public_key() || !config.has_secret_key() {
            return Err(TelemetryError::NotConfigured(
                "Langfuse public and secret keys are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.backend_timeout())
            .build()
            .map_err(|e| TelemetryError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: config.host.trim().trim_end_matches('/').to_string(),
            public_key: config.public_key.clone(),
            secret_key: config.secret_key.clone(),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Base URL requests are sent to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of events waiting for the next flush.
    pub fn buffered_len(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Copy of the events waiting for the next flush.
    pub fn buffered_events(&self) -> Vec<IngestionEvent> {
        self.lock_buffer().clone()
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<IngestionEvent>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, kind: EventKind, body: Value) {
        self.lock_buffer().push(IngestionEvent::new(kind, body));
    }

    fn end_observation(&self, kind: EventKind, id: &str, trace_id: &str) {
        self.enqueue(
            kind,
            json!({
                "id": id,
                "traceId": trace_id,
                "endTime": now(),
            }),
        );
    }
}

#[async_trait]
impl TelemetryClient for LangfuseClient {
    fn name(&self) -> &str {
        "langfuse"
    }

    fn pending(&self) -> usize {
        self.buffered_len()
    }

    async fn authenticate(&self) -> Result<(), TelemetryError> {
        let response = self
            .client
            .get(format!("{}{}", self.host, AUTH_CHECK_PATH))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(host = %self.host, "Langfuse credentials accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryError::from_status(status.as_u16(), &body))
    }

    async fn create_trace(&self, request: TraceRequest) -> Result<TraceHandle, TelemetryError> {
        let handle = TraceHandle {
            trace_id: Uuid::new_v4().to_string(),
            root_id: Uuid::new_v4().to_string(),
        };
        let timestamp = now();

        self.enqueue(
            EventKind::TraceCreate,
            json!({
                "id": handle.trace_id,
                "timestamp": timestamp,
                "name": request.name,
                "input": request.input,
                "metadata": request.metadata,
            }),
        );
        self.enqueue(
            EventKind::SpanCreate,
            json!({
                "id": handle.root_id,
                "traceId": handle.trace_id,
                "name": request.name,
                "startTime": timestamp,
                "input": request.input,
                "metadata": request.metadata,
            }),
        );

        Ok(handle)
    }

    async fn update_trace(
        &self,
        trace: &TraceHandle,
        update: TraceUpdate,
    ) -> Result<(), TelemetryError> {
        let mut body = Map::new();
        body.insert("id".to_string(), json!(trace.trace_id));
        put(&mut body, "userId", update.user_id);
        put(&mut body, "sessionId", update.session_id);
        put(&mut body, "input", update.input);
        put(&mut body, "output", update.output);
        put(&mut body, "metadata", update.metadata);
        put(&mut body, "tags", update.tags);

        self.enqueue(EventKind::TraceCreate, Value::Object(body));
        Ok(())
    }

    async fn create_span(
        &self,
        trace: &TraceHandle,
        request: SpanRequest,
    ) -> Result<SpanHandle, TelemetryError> {
        let handle = SpanHandle {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.trace_id.clone(),
        };

        let mut body = Map::new();
        body.insert("id".to_string(), json!(handle.id));
        body.insert("traceId".to_string(), json!(trace.trace_id));
        body.insert("parentObservationId".to_string(), json!(trace.root_id));
        body.insert("name".to_string(), json!(request.name));
        body.insert("startTime".to_string(), json!(now()));
        put(&mut body, "input", request.input);
        put(&mut body, "metadata", request.metadata);

        self.enqueue(EventKind::SpanCreate, Value::Object(body));
        Ok(handle)
    }

    async fn end_span(&self, span: &SpanHandle) -> Result<(), TelemetryError> {
        self.end_observation(EventKind::SpanUpdate, &span.id, &span.trace_id);
        Ok(())
    }

    async fn create_generation(
        &self,
        trace: &TraceHandle,
        request: GenerationRequest,
    ) -> Result<GenerationHandle, TelemetryError> {
        let handle = GenerationHandle {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.trace_id.clone(),
        };

        let mut body = Map::new();
        body.insert("id".to_string(), json!(handle.id));
        body.insert("traceId".to_string(), json!(trace.trace_id));
        body.insert("parentObservationId".to_string(), json!(trace.root_id));
        body.insert("name".to_string(), json!(request.name));
        body.insert("startTime".to_string(), json!(now()));
        put(&mut body, "model", request.model);
        body.insert("input".to_string(), request.input);
        body.insert("output".to_string(), request.output);
        body.insert("metadata".to_string(), Value::Object(request.metadata));

        self.enqueue(EventKind::GenerationCreate, Value::Object(body));
        Ok(handle)
    }

    async fn attach_usage(
        &self,
        generation: &GenerationHandle,
        usage: UsageRecord,
    ) -> Result<(), TelemetryError> {
        self.enqueue(
            EventKind::GenerationUpdate,
            json!({
                "id": generation.id,
                "traceId": generation.trace_id,
                "usage": usage,
            }),
        );
        Ok(())
    }

    async fn end_generation(&self, generation: &GenerationHandle) -> Result<(), TelemetryError> {
        self.end_observation(EventKind::GenerationUpdate, &generation.id, &generation.trace_id);
        Ok(())
    }

    async fn end_trace(&self, trace: &TraceHandle) -> Result<(), TelemetryError> {
        self.end_observation(EventKind::SpanUpdate, &trace.root_id, &trace.trace_id);
        Ok(())
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        // Drained up front: a failed batch is dropped, not retried.
        let batch = std::mem::take(&mut *self.lock_buffer());
        if batch.is_empty() {
            return Ok(());
        }
        let total = batch.len();

        debug!(events = total, host = %self.host, "Flushing Langfuse batch");

        let response = self
            .client
            .post(format!("{}{}", self.host, INGESTION_PATH))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::from_status(status.as_u16(), &body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(());
        }
        let parsed: IngestionResponse =
            serde_json::from_str(&text).map_err(|e| TelemetryError::Parse(e.to_string()))?;

        if parsed.errors.is_empty() {
            Ok(())
        } else {
            for error in &parsed.errors {
                debug!(
                    event = %error.id,
                    status = error.status,
                    message = error.message.as_deref().unwrap_or(""),
                    "Langfuse rejected event"
                );
            }
            Err(TelemetryError::Rejected {
                count: parsed.errors.len(),
                total,
            })
        }
    }
}
