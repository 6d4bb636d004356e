// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observability backend abstraction.
//!
//! The lifecycle manager only ever talks to a [`TelemetryClient`]. Every
//! operation returns a `Result`, so a failed backend call is a value the
//! caller can branch on and log rather than something that unwinds through
//! the chat path.
//!
//! - [`langfuse::LangfuseClient`] - buffered client for the Langfuse ingestion API

pub mod langfuse;

pub use langfuse::LangfuseClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::TelemetryError;
use crate::types::UsageRecord;

/// Handle to a trace created on the backend.
///
/// Traces carry a root observation; child spans and generations hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceHandle {
    pub trace_id: String,
    pub root_id: String,
}

/// Handle to a child span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanHandle {
    pub id: String,
    pub trace_id: String,
}

/// Handle to a generation record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    pub id: String,
    pub trace_id: String,
}

/// Arguments for creating a trace.
#[derive(Debug, Clone, Default)]
pub struct TraceRequest {
    pub name: String,
    pub input: Value,
    pub metadata: Map<String, Value>,
}

/// Fields to overwrite on an existing trace. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceUpdate {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

/// Arguments for creating a child span.
#[derive(Debug, Clone, Default)]
pub struct SpanRequest {
    pub name: String,
    pub input: Option<Value>,
    pub metadata: Option<Map<String, Value>>,
}

/// Arguments for creating a generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub name: String,
    pub model: Option<String>,
    pub input: Value,
    pub output: Value,
    pub metadata: Map<String, Value>,
}

/// Client for an observability backend.
///
/// Implementations may buffer records and only deliver them on [`flush`].
///
/// [`flush`]: TelemetryClient::flush
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Records buffered and not yet delivered.
    fn pending(&self) -> usize {
        0
    }

    /// Verify the configured credentials.
    async fn authenticate(&self) -> Result<(), TelemetryError>;

    async fn create_trace(&self, request: TraceRequest) -> Result<TraceHandle, TelemetryError>;

    async fn update_trace(
        &self,
        trace: &TraceHandle,
        update: TraceUpdate,
    ) -> Result<(), TelemetryError>;

    async fn create_span(
        &self,
        trace: &TraceHandle,
        request: SpanRequest,
    ) -> Result<SpanHandle, TelemetryError>;

    async fn end_span(&self, span: &SpanHandle) -> Result<(), TelemetryError>;

    async fn create_generation(
        &self,
        trace: &TraceHandle,
        request: GenerationRequest,
    ) -> Result<GenerationHandle, TelemetryError>;

    async fn attach_usage(
        &self,
        generation: &GenerationHandle,
        usage: UsageRecord,
    ) -> Result<(), TelemetryError>;

    async fn end_generation(&self, generation: &GenerationHandle) -> Result<(), TelemetryError>;

    /// Finalize a trace (ends its root observation).
    async fn end_trace(&self, trace: &TraceHandle) -> Result<(), TelemetryError>;

    /// Deliver buffered records.
    async fn flush(&self) -> Result<(), TelemetryError>;
}

/// Shared telemetry client.
pub type SharedTelemetryClient = Arc<dyn TelemetryClient>;
