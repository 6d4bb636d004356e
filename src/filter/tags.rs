// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace tag computation.

use crate::types::TaskType;

/// Tag identifying where a trace came from.
pub const ORIGIN_TAG: &str = "open-webui";

/// Ordered set of trace tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    /// Tags to send, or `None` so an empty set does not clear backend tags.
    pub fn into_option(self) -> Option<Vec<String>> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0)
        }
    }

    fn push(&mut self, tag: &str) {
        if !self.contains(tag) {
            self.0.push(tag.to_string());
        }
    }
}

/// Compute the tags for a record of the given task type.
///
/// The task label is left out for ordinary chat turns since every trace
/// would carry it.
pub fn build_tags(task: &TaskType, insert_tags: bool) -> TagSet {
    let mut tags = TagSet::default();
    if !insert_tags {
        return tags;
    }

    tags.push(ORIGIN_TAG);
    if !task.is_default() {
        tags.push(task.as_str());
    }
    tags
}
