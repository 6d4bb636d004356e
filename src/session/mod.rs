// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session tracking for trace reuse.
//!
//! A chat session maps to exactly one backend trace for the lifetime of the
//! process. The registry holds that mapping plus the model identity last
//! seen for the session.
//!
//! Traced sessions are never evicted unless an idle TTL is configured, so a
//! long-running process keeps one entry per distinct session it has traced.

pub mod registry;

pub use registry::{
    ModelIdentity, SessionGate, SessionKey, SessionPatch, SessionRecord, SessionRegistry,
};
