// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Token usage extraction from assistant messages.
//!
//! Backends report usage under different names: Ollama uses
//! `prompt_eval_count`/`eval_count`, OpenAI-style APIs use
//! `prompt_tokens`/`completion_tokens`. Each side is resolved on its own, so
//! a message mixing both conventions still yields a record.

use serde_json::{Map, Value};

use crate::types::UsageRecord;

/// Field names for the input side, in lookup order.
pub const INPUT_FIELDS: &[&str] = &["prompt_eval_count", "prompt_tokens"];

/// Field names for the output side, in lookup order.
pub const OUTPUT_FIELDS: &[&str] = &["eval_count", "completion_tokens"];

/// Extract usage from a message's `usage` block.
///
/// Returns `None` unless both sides resolve to a non-negative integer.
pub fn extract_usage(message: &Map<String, Value>) -> Option<UsageRecord> {
    let usage = message.get("usage")?.as_object()?;
    let input = first_count(usage, INPUT_FIELDS)?;
    let output = first_count(usage, OUTPUT_FIELDS)?;
    Some(UsageRecord::tokens(input, output))
}

fn first_count(usage: &Map<String, Value>, fields: &[&str]) -> Option<u64> {
    fields
        .iter()
        .find_map(|field| usage.get(*field).and_then(Value::as_u64))
}
