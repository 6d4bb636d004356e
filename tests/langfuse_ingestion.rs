// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Langfuse filter against a mock ingestion API.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use pipetrace::config::LangfuseConfig;
use pipetrace::filter::LifecycleSettings;
use pipetrace::{ChatBody, Filter, LangfuseClient, LangfuseFilter, TraceLifecycleManager, UserInfo};

async fn mock_langfuse(auth_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/projects"))
        .respond_with(ResponseTemplate::new(auth_status).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/ingestion"))
        .respond_with(
            ResponseTemplate::new(207).set_body_json(json!({"successes": [], "errors": []})),
        )
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> LangfuseConfig {
    LangfuseConfig::new(server.uri(), "pk-lf-test", "sk-lf-test")
}

async fn ingested_batches(server: &MockServer) -> Vec<Vec<Value>> {
    let requests: Vec<Request> = server.received_requests().await.unwrap_or_default();
    requests
        .iter()
        .filter(|r| r.url.path() == "/api/public/ingestion")
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["batch"].as_array().cloned().unwrap_or_default()
        })
        .collect()
}

fn types(batch: &[Value]) -> Vec<&str> {
    batch.iter().filter_map(|e| e["type"].as_str()).collect()
}

#[tokio::test]
async fn test_turn_is_delivered_as_one_batch() {
    let server = mock_langfuse(200).await;
    let filter = LangfuseFilter::new(config_for(&server));
    filter.on_startup().await;
    assert!(filter.is_enabled().await);

    let user = UserInfo::with_email("a@b.c");
    let request = ChatBody::from_value(json!({
        "model": "gpt-x",
        "messages": [{"role": "user", "content": "hi"}],
        "metadata": {"chat_id": "abc"}
    }))
    .unwrap();
    filter.inlet(request, Some(&user)).await.unwrap();
    assert!(ingested_batches(&server).await.is_empty());

    let reply = ChatBody::from_value(json!({
        "model": "gpt-x",
        "chat_id": "abc",
        "messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello",
             "usage": {"prompt_tokens": 3, "completion_tokens": 7}}
        ]
    }))
    .unwrap();
    filter.outlet(reply, Some(&user)).await.unwrap();

    let batches = ingested_batches(&server).await;
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(
        types(batch),
        vec![
            "trace-create",
            "span-create",
            "trace-create",
            "span-create",
            "span-update",
            "trace-create",
            "generation-create",
            "generation-update",
            "generation-update",
        ]
    );

    let trace = &batch[0]["body"];
    assert_eq!(trace["name"], "chat:abc");
    let trace_id = trace["id"].as_str().unwrap();

    let update = &batch[2]["body"];
    assert_eq!(update["userId"], "a@b.c");
    assert_eq!(update["sessionId"], "abc");
    assert_eq!(update["tags"], json!(["open-webui"]));

    let root_id = batch[1]["body"]["id"].as_str().unwrap();
    let generation = &batch[6]["body"];
    assert_eq!(generation["traceId"], trace_id);
    assert_eq!(generation["parentObservationId"], root_id);
    assert_eq!(generation["model"], "gpt-x");
    assert_eq!(generation["output"], "hello");
    assert_eq!(generation["metadata"]["model_name"], "unknown");

    assert_eq!(
        batch[7]["body"]["usage"],
        json!({"input": 3, "output": 7, "unit": "TOKENS"})
    );

    // Shutdown ends the root span and flushes again.
    filter.on_shutdown().await;
    let batches = ingested_batches(&server).await;
    assert_eq!(batches.len(), 2);
    assert_eq!(types(&batches[1]), vec!["span-update"]);
    assert_eq!(batches[1][0]["body"]["id"], root_id);
}

#[tokio::test]
async fn test_rejected_credentials_disable_recording() {
    let server = mock_langfuse(401).await;
    let filter = LangfuseFilter::new(config_for(&server));
    filter.on_startup().await;
    assert!(!filter.is_enabled().await);

    let request = ChatBody::from_value(json!({
        "model": "gpt-x",
        "messages": [],
        "metadata": {"chat_id": "abc"}
    }))
    .unwrap();
    let out = filter.inlet(request.clone(), None).await.unwrap();
    assert_eq!(out, request);

    filter.on_shutdown().await;
    assert!(ingested_batches(&server).await.is_empty());
}

#[tokio::test]
async fn test_config_update_reconnects() {
    let server = mock_langfuse(200).await;
    let filter = LangfuseFilter::new(LangfuseConfig::default());
    filter.on_startup().await;
    assert!(!filter.is_enabled().await);

    filter.on_config_updated(config_for(&server)).await;
    assert!(filter.is_enabled().await);
}

#[tokio::test]
async fn test_requests_without_responses_keep_buffer_bounded() {
    let server = mock_langfuse(200).await;
    let mut config = config_for(&server);
    config.flush_at = 20;

    let client = LangfuseClient::new(&config).unwrap();
    let manager = TraceLifecycleManager::new(LifecycleSettings::from(&config));
    let content = "x".repeat(1024);

    for i in 0..200 {
        let request = ChatBody::from_value(json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": content}],
            "metadata": {"chat_id": format!("chat-{}", i)}
        }))
        .unwrap();
        manager.on_request(&client, request, None).await.unwrap();
        assert!(client.buffered_len() < 20);
    }

    // Each new session queues five events.
    let delivered: usize = ingested_batches(&server).await.iter().map(Vec::len).sum();
    assert_eq!(delivered + client.buffered_len(), 1000);
    assert!(delivered >= 980);
}
