// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and in-process metrics for the filters themselves.
//!
//! Not to be confused with [`crate::backend`], which is where the recorded
//! chat traces go. This module covers pipetrace's own observability:
//!
//! - **Logging**: `tracing` subscriber setup driven by the config debug flag
//! - **Metrics**: backend failures by kind, hook latency, generation and token totals
//! - **Spans**: [`HookSpan`] wraps each hook invocation
//!
//! # Usage
//!
//! ```rust,ignore
//! use pipetrace::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_debug(config.debug))?;
//! ```

mod init;
pub mod metrics;
mod spans;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{BackendCallMetrics, HookLatency, Metrics, MetricsSnapshot, GLOBAL_METRICS};
pub use spans::HookSpan;
