// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Replay recorded hook calls through a filter pipeline.
//!
//! Input is JSON Lines, one hook call per line:
//!
//! ```text
//! {"phase": "inlet", "body": {...}, "user": {"email": "a@b.c", "role": "user"}}
//! {"phase": "outlet", "body": {...}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::pipeline::FilterPipeline;
use crate::types::{ChatBody, UserInfo};

/// Which hook a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPhase {
    Inlet,
    Outlet,
}

/// One recorded hook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub phase: ReplayPhase,
    pub body: ChatBody,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

/// Result of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub inlets: usize,
    pub outlets: usize,
    /// Rejected calls as `(line, error message)`.
    pub rejected: Vec<(usize, String)>,
}

/// Parse a JSON Lines replay file.
pub fn parse_events(input: &str) -> Result<Vec<(usize, ReplayEvent)>> {
    input
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            let event: ReplayEvent = serde_json::from_str(line)
                .with_context(|| format!("invalid replay event on line {}", number))?;
            Ok((number, event))
        })
        .collect()
}

/// Run every event through the pipeline in order.
///
/// A rejected call is recorded and the replay continues.
pub async fn replay(pipeline: &FilterPipeline, events: Vec<(usize, ReplayEvent)>) -> ReplaySummary {
    let mut summary = ReplaySummary::default();

    for (line, event) in events {
        let user = event.user.as_ref();
        let result = match event.phase {
            ReplayPhase::Inlet => {
                summary.inlets += 1;
                pipeline.inlet(event.body, user).await
            }
            ReplayPhase::Outlet => {
                summary.outlets += 1;
                pipeline.outlet(event.body, user).await
            }
        };

        if let Err(e) = result {
            warn!(line, error = %e, "Replay event rejected");
            summary.rejected.push((line, e.to_string()));
        }
    }

    summary
}
