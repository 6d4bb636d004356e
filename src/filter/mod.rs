// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Langfuse tracing filter.
//!
//! - [`hooks`] - the [`LangfuseFilter`] hook surface
//! - [`lifecycle`] - per-session trace transitions
//! - [`keys`] - session key derivation
//! - [`tags`] - trace tags
//! - [`usage`] - token usage extraction

pub mod hooks;
pub mod keys;
pub mod lifecycle;
pub mod tags;
pub mod usage;

pub use hooks::LangfuseFilter;
pub use keys::{alias_session_key, request_session_key, response_session_key};
pub use lifecycle::{
    validate_request, LifecycleSettings, ShutdownReport, TraceLifecycleManager, INTERFACE,
};
pub use tags::{build_tags, TagSet, ORIGIN_TAG};
pub use usage::extract_usage;
