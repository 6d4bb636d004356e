// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end tests for the Langfuse filter running inside a pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use pipetrace::backend::{
    GenerationHandle, GenerationRequest, SpanHandle, SpanRequest, TelemetryClient, TraceHandle,
    TraceRequest, TraceUpdate,
};
use pipetrace::config::{LangfuseConfig, TurnLimitConfig};
use pipetrace::{
    ChatBody, Filter, FilterError, FilterPipeline, LangfuseFilter, TelemetryError,
    TurnLimitFilter, UsageRecord, UserInfo,
};

// ============================================================================
// Recording client
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Event {
    TraceCreated { name: String },
    TraceUpdated { trace: String, update: TraceUpdate },
    SpanCreated { trace: String, name: String },
    SpanEnded,
    GenerationCreated { trace: String, model: Option<String>, output: Value },
    UsageAttached(UsageRecord),
    GenerationEnded,
    TraceEnded(String),
    Flushed,
}

#[derive(Default)]
struct RecordingClient {
    events: Mutex<Vec<Event>>,
    failing: Mutex<HashSet<&'static str>>,
    reject_auth: bool,
    create_delay: Option<Duration>,
    ids: AtomicUsize,
}

impl RecordingClient {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|&e| matches(e)).count()
    }

    fn push(&self, operation: &'static str, event: Event) -> Result<(), TelemetryError> {
        self.events.lock().unwrap().push(event);
        if self.failing.lock().unwrap().contains(operation) {
            Err(TelemetryError::api(format!("{} unavailable", operation), 503))
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.ids.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl TelemetryClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn authenticate(&self) -> Result<(), TelemetryError> {
        if self.reject_auth {
            return Err(TelemetryError::Auth("401 Unauthorized".to_string()));
        }
        Ok(())
    }

    async fn create_trace(&self, request: TraceRequest) -> Result<TraceHandle, TelemetryError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.push("create_trace", Event::TraceCreated { name: request.name })?;
        let id = self.next_id("trace");
        Ok(TraceHandle {
            root_id: format!("{}-root", id),
            trace_id: id,
        })
    }

    async fn update_trace(
        &self,
        trace: &TraceHandle,
        update: TraceUpdate,
    ) -> Result<(), TelemetryError> {
        self.push(
            "update_trace",
            Event::TraceUpdated {
                trace: trace.trace_id.clone(),
                update,
            },
        )
    }

    async fn create_span(
        &self,
        trace: &TraceHandle,
        request: SpanRequest,
    ) -> Result<SpanHandle, TelemetryError> {
        self.push(
            "create_span",
            Event::SpanCreated {
                trace: trace.trace_id.clone(),
                name: request.name,
            },
        )?;
        Ok(SpanHandle {
            id: self.next_id("span"),
            trace_id: trace.trace_id.clone(),
        })
    }

    async fn end_span(&self, _span: &SpanHandle) -> Result<(), TelemetryError> {
        self.push("end_span", Event::SpanEnded)
    }

    async fn create_generation(
        &self,
        trace: &TraceHandle,
        request: GenerationRequest,
    ) -> Result<GenerationHandle, TelemetryError> {
        self.push(
            "create_generation",
            Event::GenerationCreated {
                trace: trace.trace_id.clone(),
                model: request.model,
                output: request.output,
            },
        )?;
        Ok(GenerationHandle {
            id: self.next_id("generation"),
            trace_id: trace.trace_id.clone(),
        })
    }

    async fn attach_usage(
        &self,
        _generation: &GenerationHandle,
        usage: UsageRecord,
    ) -> Result<(), TelemetryError> {
        self.push("attach_usage", Event::UsageAttached(usage))
    }

    async fn end_generation(&self, _generation: &GenerationHandle) -> Result<(), TelemetryError> {
        self.push("end_generation", Event::GenerationEnded)
    }

    async fn end_trace(&self, trace: &TraceHandle) -> Result<(), TelemetryError> {
        self.push("end_trace", Event::TraceEnded(trace.trace_id.clone()))
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        self.push("flush", Event::Flushed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn body(value: Value) -> ChatBody {
    ChatBody::from_value(value).unwrap()
}

fn request(chat_id: &str, text: &str) -> ChatBody {
    body(json!({
        "model": "gpt-x",
        "messages": [{"role": "user", "content": text}],
        "metadata": {"chat_id": chat_id}
    }))
}

fn user() -> UserInfo {
    UserInfo::with_email("a@b.c").role("user")
}

async fn filter_with(client: Arc<RecordingClient>) -> Arc<LangfuseFilter> {
    Arc::new(LangfuseFilter::with_client(LangfuseConfig::default(), client).await)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_turn_end_to_end() {
    let client = RecordingClient::new();
    let filter = filter_with(client.clone()).await;

    let out = filter
        .inlet(request("abc", "hi"), Some(&user()))
        .await
        .unwrap();
    let metadata = out.metadata().unwrap();
    assert_eq!(metadata["chat_id"], "abc");
    assert_eq!(metadata["type"], "user_response");
    assert_eq!(metadata["interface"], "open-webui");

    let reply = body(json!({
        "model": "gpt-x",
        "chat_id": "abc",
        "messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello",
             "usage": {"prompt_tokens": 3, "completion_tokens": 7}}
        ]
    }));
    let returned = filter.outlet(reply.clone(), Some(&user())).await.unwrap();
    assert_eq!(returned, reply);

    let events = client.events();
    assert_eq!(
        events[0],
        Event::TraceCreated {
            name: "chat:abc".to_string()
        }
    );
    assert_eq!(client.count(|e| matches!(e, Event::TraceCreated { .. })), 1);
    assert_eq!(client.count(|e| matches!(e, Event::SpanCreated { name, .. } if name.starts_with("user_input:"))), 1);
    assert!(events.contains(&Event::GenerationCreated {
        trace: "trace-0".to_string(),
        model: Some("gpt-x".to_string()),
        output: json!("hello"),
    }));
    assert!(events.contains(&Event::UsageAttached(UsageRecord::tokens(3, 7))));
    assert_eq!(events.last(), Some(&Event::Flushed));

    let tags: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::TraceUpdated { update, .. } => update.tags.clone(),
            _ => None,
        })
        .collect();
    assert!(tags.iter().all(|t| t == &vec!["open-webui".to_string()]));
}

#[tokio::test]
async fn test_outlet_without_inlet_registers_session() {
    let client = RecordingClient::new();
    let filter = filter_with(client.clone()).await;

    let reply = body(json!({
        "model": "gpt-x",
        "chat_id": "late",
        "messages": [{"role": "assistant", "content": "hello"}]
    }));
    let out = filter.outlet(reply, None).await.unwrap();

    assert_eq!(out.metadata().unwrap()["chat_id"], "late");
    assert!(filter.lifecycle().registry().has_trace("late"));
    assert_eq!(client.count(|e| matches!(e, Event::GenerationCreated { .. })), 0);

    // The next response for the session is recorded normally.
    let reply = body(json!({
        "chat_id": "late",
        "messages": [{"role": "assistant", "content": "again"}]
    }));
    filter.outlet(reply, None).await.unwrap();
    assert_eq!(client.count(|e| matches!(e, Event::TraceCreated { .. })), 1);
    assert_eq!(client.count(|e| matches!(e, Event::GenerationCreated { .. })), 1);
}

#[tokio::test]
async fn test_rejected_credentials_pass_bodies_through() {
    let client = Arc::new(RecordingClient {
        reject_auth: true,
        ..Default::default()
    });
    let filter = filter_with(client.clone()).await;

    let original = request("abc", "hi");
    assert_eq!(filter.inlet(original.clone(), None).await.unwrap(), original);
    assert_eq!(filter.outlet(original.clone(), None).await.unwrap(), original);
    assert!(client.events().is_empty());
}

#[tokio::test]
async fn test_backend_outage_never_fails_hooks() {
    let client = RecordingClient::new();
    for operation in [
        "update_trace",
        "create_span",
        "end_span",
        "create_generation",
        "flush",
    ] {
        client.fail(operation);
    }
    let filter = filter_with(client.clone()).await;

    assert!(filter.inlet(request("abc", "hi"), None).await.is_ok());
    let reply = body(json!({
        "chat_id": "abc",
        "messages": [{"role": "assistant", "content": "hello"}]
    }));
    assert!(filter.outlet(reply, None).await.is_ok());
    assert!(filter.lifecycle().registry().has_trace("abc"));
}

#[tokio::test]
async fn test_shutdown_ends_every_trace_once() {
    let client = RecordingClient::new();
    let filter = filter_with(client.clone()).await;

    for chat in ["a", "b", "c"] {
        filter.inlet(request(chat, "hi"), None).await.unwrap();
    }
    client.fail("end_trace");

    let report = filter.close_sessions().await.unwrap();
    assert_eq!(report.ended, 0);
    assert_eq!(report.failed.len(), 3);
    assert!(report.flushed);

    let ended: HashSet<String> = client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::TraceEnded(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(ended.len(), 3);
    assert_eq!(client.count(|e| matches!(e, Event::TraceEnded(_))), 3);
    assert_eq!(client.events().last(), Some(&Event::Flushed));

    filter.on_shutdown().await;
    assert_eq!(client.count(|e| matches!(e, Event::TraceEnded(_))), 3);
}

#[tokio::test]
async fn test_concurrent_inlets_share_one_trace() {
    let client = Arc::new(RecordingClient {
        create_delay: Some(Duration::from_millis(25)),
        ..Default::default()
    });
    let filter = filter_with(client.clone()).await;

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let filter = Arc::clone(&filter);
            tokio::spawn(async move {
                filter
                    .inlet(request("shared", &format!("msg {}", i)), None)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(client.count(|e| matches!(e, Event::TraceCreated { .. })), 1);
    assert_eq!(client.count(|e| matches!(e, Event::SpanCreated { .. })), 10);
}

#[tokio::test]
async fn test_independent_sessions_do_not_block() {
    let client = Arc::new(RecordingClient {
        create_delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let filter = filter_with(client.clone()).await;

    let started = std::time::Instant::now();
    let handles: Vec<_> = (0..5)
        .map(|i| {
            let filter = Arc::clone(&filter);
            tokio::spawn(async move {
                filter
                    .inlet(request(&format!("chat-{}", i), "hi"), None)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(client.count(|e| matches!(e, Event::TraceCreated { .. })), 5);
    assert!(started.elapsed() < Duration::from_millis(240));
}

#[tokio::test]
async fn test_temporary_chats_keyed_by_session() {
    let client = RecordingClient::new();
    let filter = filter_with(client.clone()).await;

    let first = body(json!({
        "model": "gpt-x",
        "messages": [],
        "metadata": {"chat_id": "local", "session_id": "s1"}
    }));
    let second = body(json!({
        "model": "gpt-x",
        "messages": [],
        "metadata": {"chat_id": "local", "session_id": "s2"}
    }));

    let out = filter.inlet(first, None).await.unwrap();
    assert_eq!(out.metadata().unwrap()["chat_id"], "temporary-session-s1");
    filter.inlet(out, None).await.unwrap();
    filter.inlet(second, None).await.unwrap();

    let names: Vec<String> = client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::TraceCreated { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec!["chat:temporary-session-s1", "chat:temporary-session-s2"]
    );
}

#[tokio::test]
async fn test_usage_conventions() {
    let client = RecordingClient::new();
    let filter = filter_with(client.clone()).await;
    filter.inlet(request("u", "hi"), None).await.unwrap();

    for usage in [
        json!({"prompt_eval_count": 20, "eval_count": 40}),
        json!({"prompt_tokens": 12, "eval_count": 5}),
        json!({"prompt_tokens": 12}),
    ] {
        let reply = body(json!({
            "chat_id": "u",
            "messages": [{"role": "assistant", "content": "x", "usage": usage}]
        }));
        filter.outlet(reply, None).await.unwrap();
    }

    let usages: Vec<UsageRecord> = client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::UsageAttached(usage) => Some(usage),
            _ => None,
        })
        .collect();
    assert_eq!(
        usages,
        vec![UsageRecord::tokens(20, 40), UsageRecord::tokens(12, 5)]
    );
    assert_eq!(client.count(|e| matches!(e, Event::GenerationCreated { .. })), 3);
}

#[tokio::test]
async fn test_pipeline_with_turn_limit() {
    let client = RecordingClient::new();
    let langfuse = filter_with(client.clone()).await;
    let pipeline = FilterPipeline::new()
        .with_filter(Arc::new(TurnLimitFilter::new(TurnLimitConfig {
            max_turns: 2,
            ..Default::default()
        })))
        .with_filter(langfuse.clone());

    assert_eq!(
        pipeline.names(),
        vec![LangfuseFilter::NAME, TurnLimitFilter::NAME]
    );

    let ok = pipeline.inlet(request("t", "one"), Some(&user())).await;
    assert!(ok.is_ok());

    let long = body(json!({
        "model": "gpt-x",
        "messages": [
            {"role": "user", "content": "1"},
            {"role": "user", "content": "2"},
            {"role": "user", "content": "3"}
        ],
        "metadata": {"chat_id": "t"}
    }));
    let err = pipeline.inlet(long, Some(&user())).await.unwrap_err();
    assert_eq!(err, FilterError::TurnLimitExceeded { max_turns: 2 });
    assert_eq!(err.to_string(), "Conversation limit exceeded (2 turns max)");

    pipeline.shutdown().await;
    assert_eq!(client.count(|e| matches!(e, Event::TraceEnded(_))), 1);
}

#[tokio::test]
async fn test_missing_keys_surface_through_pipeline() {
    let client = RecordingClient::new();
    let pipeline = FilterPipeline::new().with_filter(filter_with(client.clone()).await);

    let err = pipeline
        .inlet(body(json!({"metadata": {"chat_id": "x"}})), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Missing keys in the request body: model, messages"
    );
    assert!(client.events().is_empty());
}
