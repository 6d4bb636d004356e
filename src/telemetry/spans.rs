// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for consistent instrumentation of filter hooks.

use std::time::Instant;
use tracing::{info_span, Span};

/// RAII guard for timing one hook invocation.
///
/// Records the hook name and duration to the global metrics when finished
/// or dropped, whichever comes first.
pub struct HookSpan {
    name: String,
    start: Instant,
    span: Span,
    finished: bool,
}

impl HookSpan {
    /// Start a new hook span, e.g. `HookSpan::start("langfuse", "inlet")`.
    pub fn start(filter: &str, hook: &str) -> Self {
        let span = info_span!(
            "hook",
            filter = %filter,
            hook = %hook,
            session = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        );

        Self {
            name: format!("{}.{}", filter, hook),
            start: Instant::now(),
            span,
            finished: false,
        }
    }

    /// Get the underlying tracing span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Finish the span, recording duration and outcome.
    pub fn finish<T, E>(mut self, result: &Result<T, E>) {
        self.span.record("success", result.is_ok());
        self.complete();
    }

    fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = self.start.elapsed();
        self.span
            .record("duration_ms", duration.as_secs_f64() * 1000.0);
        super::metrics::GLOBAL_METRICS.record_hook(&self.name, duration);
    }
}

impl Drop for HookSpan {
    fn drop(&mut self) {
        self.complete();
    }
}
