// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions shared by the filters.
//!
//! The host hands request and response bodies over as loosely-shaped JSON
//! objects. [`ChatBody`] keeps the object intact (unknown fields survive the
//! round trip) and adds typed accessors for the handful of fields the filters
//! read or write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Chat Body
// ============================================================================

/// A request or response body as exchanged with the host runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatBody(Map<String, Value>);

impl ChatBody {
    /// Create an empty body.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, returning `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Convert back into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Model identifier (`model`).
    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    /// Message list (`messages`), empty if absent or not a list.
    pub fn messages(&self) -> &[Value] {
        self.0
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The `metadata` object, if present.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    /// Mutable access to `metadata`, creating it when missing.
    ///
    /// A non-object `metadata` value is replaced by an empty object.
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("metadata slot was just normalized to an object"),
        }
    }

    /// Top-level `chat_id` (set on response bodies).
    pub fn chat_id(&self) -> Option<&str> {
        self.0.get("chat_id").and_then(Value::as_str)
    }

    /// Top-level `session_id` (set on response bodies).
    pub fn session_id(&self) -> Option<&str> {
        self.0.get("session_id").and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for ChatBody {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ChatBody> for Value {
    fn from(body: ChatBody) -> Self {
        body.into_value()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Return the last message whose role is `assistant`.
pub fn last_assistant_message(messages: &[Value]) -> Option<&Map<String, Value>> {
    messages
        .iter()
        .rev()
        .filter_map(Value::as_object)
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
}

/// Plain text of a message's `content`.
///
/// String content is returned as-is. List content (multimodal parts) is
/// reduced to its `text` parts joined with newlines.
pub fn message_text(message: &Map<String, Value>) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Count messages with the given role.
pub fn count_role(messages: &[Value], role: &str) -> usize {
    messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some(role))
        .count()
}

// ============================================================================
// Caller Identity
// ============================================================================

/// Authenticated user as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserInfo {
    /// Create a user with an email address.
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Builder-style role setter.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

// ============================================================================
// Task Type
// ============================================================================

/// What kind of model call a request represents.
///
/// The two default variants cover ordinary chat turns. Anything else the host
/// puts in `metadata.task` (title generation, RAG queries, ...) is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskType {
    UserResponse,
    LlmResponse,
    Other(String),
}

impl TaskType {
    pub const USER_RESPONSE: &'static str = "user_response";
    pub const LLM_RESPONSE: &'static str = "llm_response";

    /// Parse a task name.
    pub fn parse(name: &str) -> Self {
        match name {
            Self::USER_RESPONSE => Self::UserResponse,
            Self::LLM_RESPONSE => Self::LlmResponse,
            other => Self::Other(other.to_string()),
        }
    }

    /// Read `task` from a metadata object, falling back to `default`.
    pub fn from_metadata(metadata: Option<&Map<String, Value>>, default: TaskType) -> Self {
        metadata
            .and_then(|m| m.get("task"))
            .and_then(Value::as_str)
            .map(Self::parse)
            .unwrap_or(default)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::UserResponse => Self::USER_RESPONSE,
            Self::LlmResponse => Self::LLM_RESPONSE,
            Self::Other(name) => name,
        }
    }

    /// Whether this is one of the ordinary chat-turn task types.
    pub fn is_default(&self) -> bool {
        match self {
            Self::UserResponse | Self::LlmResponse => true,
            Self::Other(_) => false,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Usage
// ============================================================================

/// Unit of a usage record. Only token counts are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageUnit {
    Tokens,
}

/// Token usage of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input: u64,
    pub output: u64,
    pub unit: UsageUnit,
}

impl UsageRecord {
    pub fn tokens(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            unit: UsageUnit::Tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> ChatBody {
        ChatBody::from_value(value).unwrap()
    }

    #[test]
    fn test_chat_body_accessors() {
        let b = body(json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "chat_id": "abc",
            "session_id": "s1",
            "extra": 1
        }));
        assert_eq!(b.model(), Some("gpt-x"));
        assert_eq!(b.messages().len(), 1);
        assert_eq!(b.chat_id(), Some("abc"));
        assert_eq!(b.session_id(), Some("s1"));
        assert!(b.metadata().is_none());
    }

    #[test]
    fn test_chat_body_rejects_non_object() {
        assert!(ChatBody::from_value(json!([1, 2])).is_none());
        assert!(ChatBody::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_metadata_mut_creates_and_normalizes() {
        let mut b = body(json!({"metadata": "garbage"}));
        b.metadata_mut().insert("chat_id".into(), json!("c1"));
        assert_eq!(b.get("metadata"), Some(&json!({"chat_id": "c1"})));

        let mut empty = ChatBody::new();
        empty.metadata_mut();
        assert_eq!(empty.into_value(), json!({"metadata": {}}));
    }

    #[test]
    fn test_unknown_fields_survive_serde() {
        let raw = json!({"model": "m", "stream": true, "options": {"x": 1}});
        let b: ChatBody = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&b).unwrap(), raw);
    }

    #[test]
    fn test_last_assistant_message() {
        let messages = vec![
            json!({"role": "user", "content": "q1"}),
            json!({"role": "assistant", "content": "a1"}),
            json!({"role": "user", "content": "q2"}),
            json!({"role": "assistant", "content": "a2"}),
            json!({"role": "user", "content": "q3"}),
        ];
        let last = last_assistant_message(&messages).unwrap();
        assert_eq!(message_text(last), "a2");

        let none = vec![json!({"role": "user", "content": "q"})];
        assert!(last_assistant_message(&none).is_none());
    }

    #[test]
    fn test_message_text_parts() {
        let msg = json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image_url", "image_url": {"url": "x"}},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(message_text(msg.as_object().unwrap()), "first\nsecond");

        let no_content = json!({"role": "assistant"});
        assert_eq!(message_text(no_content.as_object().unwrap()), "");
    }

    #[test]
    fn test_count_role() {
        let messages = vec![
            json!({"role": "system", "content": "s"}),
            json!({"role": "user", "content": "1"}),
            json!({"role": "assistant", "content": "2"}),
            json!({"role": "user", "content": "3"}),
        ];
        assert_eq!(count_role(&messages, "user"), 2);
        assert_eq!(count_role(&messages, "tool"), 0);
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!(TaskType::parse("user_response"), TaskType::UserResponse);
        assert_eq!(TaskType::parse("llm_response"), TaskType::LlmResponse);
        assert_eq!(TaskType::parse("rag"), TaskType::Other("rag".to_string()));
        assert!(TaskType::UserResponse.is_default());
        assert!(!TaskType::parse("title_generation").is_default());
        assert_eq!(TaskType::parse("rag").to_string(), "rag");
    }

    #[test]
    fn test_task_type_from_metadata() {
        let meta = json!({"task": "tags_generation"});
        assert_eq!(
            TaskType::from_metadata(meta.as_object(), TaskType::UserResponse),
            TaskType::Other("tags_generation".to_string())
        );
        assert_eq!(
            TaskType::from_metadata(None, TaskType::LlmResponse),
            TaskType::LlmResponse
        );
    }

    #[test]
    fn test_usage_record_serializes_unit() {
        let usage = UsageRecord::tokens(3, 7);
        assert_eq!(
            serde_json::to_value(usage).unwrap(),
            json!({"input": 3, "output": 7, "unit": "TOKENS"})
        );
        assert_eq!(usage.total(), 10);
    }

    #[test]
    fn test_user_info_deserialize_partial() {
        let user: UserInfo = serde_json::from_value(json!({"email": "a@b.c", "role": "user"})).unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
        assert_eq!(user.role.as_deref(), Some("user"));
        assert!(user.id.is_none());
    }
}
