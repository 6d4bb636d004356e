// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process counters for hook latency and backend call outcomes.
//!
//! Nothing is exported anywhere; the CLI prints a [`MetricsSnapshot`] after a
//! replay. Backend failures are bucketed by [`TelemetryError::kind`] so a
//! slow backend (timeouts) reads differently from a misconfigured one (auth).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::error::TelemetryError;
use crate::types::UsageRecord;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Upper bounds of the hook latency buckets, in milliseconds.
const LATENCY_BOUNDS_MS: [u64; 5] = [1, 10, 100, 1_000, 10_000];

#[derive(Debug, Default)]
pub struct Metrics {
    /// Keyed by `<client>.<operation>`, e.g. `langfuse.flush`.
    backend: RwLock<BTreeMap<String, BackendCallMetrics>>,
    /// Keyed by `<filter>.<hook>`, e.g. `langfuse.inlet`.
    hooks: RwLock<BTreeMap<String, HookLatency>>,
    generations: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one backend call; `error` is `None` when it succeeded.
    pub fn record_backend(
        &self,
        operation: &str,
        duration: Duration,
        error: Option<&TelemetryError>,
    ) {
        self.backend
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation.to_string())
            .or_default()
            .record(duration, error);
    }

    pub fn record_hook(&self, hook: &str, duration: Duration) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hook.to_string())
            .or_default()
            .record(duration);
    }

    /// Count a generation, plus its usage if the backend accepted it.
    pub fn record_generation(&self, usage: Option<UsageRecord>) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = usage {
            self.input_tokens.fetch_add(usage.input, Ordering::Relaxed);
            self.output_tokens.fetch_add(usage.output, Ordering::Relaxed);
        }
    }

    pub fn backend_metrics(&self, operation: &str) -> Option<BackendCallMetrics> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .cloned()
    }

    pub fn hook_latency(&self, hook: &str) -> Option<HookLatency> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hook)
            .cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            backend: self
                .backend
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            hooks: self
                .hooks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            generations: self.generations.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Outcomes of one backend operation.
#[derive(Debug, Clone, Default)]
pub struct BackendCallMetrics {
    pub calls: u64,
    /// Failed calls by error kind (`timeout`, `auth`, `network`, ...).
    pub failures: BTreeMap<&'static str, u64>,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl BackendCallMetrics {
    fn record(&mut self, duration: Duration, error: Option<&TelemetryError>) {
        self.calls += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
        if let Some(error) = error {
            *self.failures.entry(error.kind()).or_default() += 1;
        }
    }

    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn timeouts(&self) -> u64 {
        self.failures.get("timeout").copied().unwrap_or(0)
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(calls) => self.total_duration / calls,
        }
    }
}

/// Latency distribution of one hook.
#[derive(Debug, Clone, Default)]
pub struct HookLatency {
    pub count: u64,
    pub total_duration: Duration,
    /// One counter per entry of the bucket bounds, plus one for anything slower.
    buckets: [u64; LATENCY_BOUNDS_MS.len() + 1],
}

impl HookLatency {
    fn record(&mut self, duration: Duration) {
        let millis = duration.as_millis();
        let slot = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| millis <= u128::from(bound))
            .unwrap_or(LATENCY_BOUNDS_MS.len());

        self.buckets[slot] += 1;
        self.count += 1;
        self.total_duration += duration;
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.total_duration / count,
        }
    }

    /// Smallest bucket bound covering `fraction` of the calls.
    ///
    /// `None` when there are no calls, or when the answer lies past the last
    /// bound.
    pub fn upper_bound(&self, fraction: f64) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let target = (self.count as f64 * fraction).ceil() as u64;

        let mut seen = 0;
        for (slot, &hits) in self.buckets.iter().enumerate() {
            seen += hits;
            if seen >= target {
                return LATENCY_BOUNDS_MS
                    .get(slot)
                    .map(|&bound| Duration::from_millis(bound));
            }
        }
        None
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub backend: BTreeMap<String, BackendCallMetrics>,
    pub hooks: BTreeMap<String, HookLatency>,
    pub generations: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl MetricsSnapshot {
    /// Failures across every backend operation, by error kind.
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, u64> {
        let mut totals = BTreeMap::new();
        for (&kind, &count) in self.backend.values().flat_map(|m| m.failures.iter()) {
            *totals.entry(kind).or_default() += count;
        }
        totals
    }

    pub fn format_report(&self) -> String {
        let mut report = format!(
            "Generations: {} ({} input tokens, {} output tokens)\n",
            self.generations, self.input_tokens, self.output_tokens
        );

        if !self.backend.is_empty() {
            report.push_str("\nBackend calls:\n");
            for (operation, metrics) in &self.backend {
                report.push_str(&format!(
                    "  {}: {} calls, {} failed, {} timed out, avg {:.2?}, max {:.2?}\n",
                    operation,
                    metrics.calls,
                    metrics.failed(),
                    metrics.timeouts(),
                    metrics.avg_duration(),
                    metrics.max_duration
                ));
            }
        }

        let failures = self.failures_by_kind();
        if !failures.is_empty() {
            let grouped: Vec<String> = failures
                .iter()
                .map(|(kind, count)| format!("{} {}", kind, count))
                .collect();
            report.push_str(&format!("  failures: {}\n", grouped.join(", ")));
        }

        if !self.hooks.is_empty() {
            report.push_str("\nHooks:\n");
            for (hook, latency) in &self.hooks {
                let p99 = latency
                    .upper_bound(0.99)
                    .map(|bound| format!("<= {:?}", bound))
                    .unwrap_or_else(|| "over 10s".to_string());
                report.push_str(&format!(
                    "  {}: {} calls, avg {:.2?}, p99 {}\n",
                    hook,
                    latency.count,
                    latency.avg_duration(),
                    p99
                ));
            }
        }

        report
    }
}
