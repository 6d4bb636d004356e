// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! pipetrace - session-scoped Langfuse tracing for chat pipelines.
//!
//! A chat front end passes every request through a chain of filters before
//! it reaches the model, and every response through the same chain on the
//! way back. pipetrace provides a filter that records each chat session as
//! one Langfuse trace: user turns become spans, model answers become
//! generations with token usage, and every trace is ended on shutdown.
//!
//! # Architecture
//!
//! - [`types`] - Chat bodies, caller identity, task types, usage records
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`backend`] - Observability backend trait and the Langfuse client
//! - [`session`] - Session-to-trace registry
//! - [`filter`] - The Langfuse filter and its trace lifecycle
//! - [`turn_limit`] - Conversation length guard
//! - [`pipeline`] - Filter trait and priority-ordered pipeline
//! - [`replay`] - Replay recorded hook calls through a pipeline
//! - [`telemetry`] - Logging, hook spans and in-process metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pipetrace::config::{load_config, CliOptions};
//! use pipetrace::{FilterPipeline, LangfuseFilter, TurnLimitFilter};
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let pipeline = FilterPipeline::new()
//!     .with_filter(Arc::new(LangfuseFilter::new(config.langfuse)))
//!     .with_filter(Arc::new(TurnLimitFilter::new(config.turn_limit)));
//!
//! pipeline.startup().await;
//! let body = pipeline.inlet(body, Some(&user)).await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod replay;
pub mod session;
pub mod telemetry;
pub mod turn_limit;
pub mod types;

// Re-export commonly used types at crate root
pub use backend::{LangfuseClient, SharedTelemetryClient, TelemetryClient};
pub use error::{ConfigError, FilterError, Result, TelemetryError};
pub use filter::{LangfuseFilter, ShutdownReport, TraceLifecycleManager};
pub use pipeline::{Filter, FilterPipeline};
pub use session::SessionRegistry;
pub use turn_limit::TurnLimitFilter;
pub use types::{ChatBody, TaskType, UsageRecord, UserInfo};

/// pipetrace version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _body = ChatBody::new();
        let _filter = TurnLimitFilter::default();
        let _pipeline = FilterPipeline::new();
    }
}
