// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session key derivation.
//!
//! Temporary (local) chats all share the chat id `local`, so their key is
//! namespaced with the session id instead. The prefix keeps them apart from
//! any real chat id.

use serde_json::Value;
use uuid::Uuid;

use crate::types::ChatBody;

/// Chat id the host uses for temporary chats.
pub const LOCAL_CHAT_ID: &str = "local";

/// Prefix for keys synthesized from a temporary chat's session id.
pub const TEMPORARY_SESSION_PREFIX: &str = "temporary-session-";

/// Map a chat id to its session key.
pub fn alias_session_key(chat_id: &str, session_id: Option<&str>) -> String {
    if chat_id == LOCAL_CHAT_ID {
        format!(
            "{}{}",
            TEMPORARY_SESSION_PREFIX,
            session_id.unwrap_or("unknown")
        )
    } else {
        chat_id.to_string()
    }
}

/// Session key for a request body, read from `metadata`.
///
/// A request without a chat id gets a fresh random key.
pub fn request_session_key(body: &ChatBody) -> String {
    let metadata = body.metadata();
    let field = |name: &str| metadata.and_then(|m| m.get(name)).and_then(Value::as_str);

    match field("chat_id") {
        Some(chat_id) => alias_session_key(chat_id, field("session_id")),
        None => Uuid::new_v4().to_string(),
    }
}

/// Session key for a response body.
///
/// Response bodies carry `chat_id`/`session_id` at the top level; the
/// metadata written by the request hook is the fallback.
pub fn response_session_key(body: &ChatBody) -> String {
    match body.chat_id() {
        Some(chat_id) => alias_session_key(chat_id, body.session_id()),
        None => request_session_key(body),
    }
}
