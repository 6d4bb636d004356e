// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory registry of live session traces.
//!
//! The map is guarded by a plain mutex that is only held for map lookups and
//! never across an `await`. Serializing the work of one session is the job of
//! the per-session gate returned by [`SessionRegistry::lock`]: a caller holds
//! it for the whole create-or-reuse decision, including the backend calls,
//! so two concurrent hooks for the same session cannot both create a trace.
//!
//! An entry that still has no trace when its last gate holder leaves is
//! dropped, so rejected requests and one-off keys do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::backend::TraceHandle;

/// Session key (chat id, or a synthesized temporary-session id).
pub type SessionKey = String;

/// Cached model identity for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelIdentity {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// A session that has a live trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub trace: TraceHandle,
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    pub open_span_count: u64,
}

/// Changes to apply to a session entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub trace: Option<TraceHandle>,
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    /// Added to the open span counter.
    pub spans_opened: u64,
}

impl SessionPatch {
    pub fn trace(trace: TraceHandle) -> Self {
        Self {
            trace: Some(trace),
            ..Default::default()
        }
    }

    pub fn model(id: Option<String>, name: Option<String>) -> Self {
        Self {
            model_id: id,
            model_name: name,
            ..Default::default()
        }
    }

    pub fn span_opened() -> Self {
        Self {
            spans_opened: 1,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    gate: Arc<AsyncMutex<()>>,
    trace: Option<TraceHandle>,
    model: ModelIdentity,
    open_span_count: u64,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            gate: Arc::new(AsyncMutex::new(())),
            trace: None,
            model: ModelIdentity::default(),
            open_span_count: 0,
            last_seen: Instant::now(),
        }
    }

    fn record(&self) -> Option<SessionRecord> {
        self.trace.as_ref().map(|trace| SessionRecord {
            trace: trace.clone(),
            model_id: self.model.id.clone(),
            model_name: self.model.name.clone(),
            open_span_count: self.open_span_count,
        })
    }
}

/// A held session gate, released on drop.
#[must_use = "the session is released as soon as the gate is dropped"]
#[derive(Debug)]
pub struct SessionGate<'a> {
    registry: &'a SessionRegistry,
    key: SessionKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGate<'_> {
    fn drop(&mut self) {
        // Taken under the map lock so no new holder can clone the gate in between.
        let mut entries = self.registry.entries();
        drop(self.guard.take());

        let abandoned = entries
            .get(&self.key)
            .is_some_and(|entry| entry.trace.is_none() && Arc::strong_count(&entry.gate) == 1);
        if abandoned {
            entries.remove(&self.key);
        }
    }
}

/// Shared session-to-trace map.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the per-session gate, creating the entry if needed.
    ///
    /// Different keys never contend; the same key is served in arrival order.
    pub async fn lock(&self, key: &str) -> SessionGate<'_> {
        let gate = {
            let mut entries = self.entries();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(SessionEntry::new);
            entry.last_seen = Instant::now();
            Arc::clone(&entry.gate)
        };
        let guard = gate.lock_owned().await;

        SessionGate {
            registry: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Snapshot of the session, if it has a live trace.
    pub fn resolve(&self, key: &str) -> Option<SessionRecord> {
        self.entries().get(key).and_then(SessionEntry::record)
    }

    /// Whether the session has a live trace.
    pub fn has_trace(&self, key: &str) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|entry| entry.trace.is_some())
    }

    /// Cached model identity, present even before a trace exists.
    pub fn model_identity(&self, key: &str) -> Option<ModelIdentity> {
        self.entries().get(key).map(|entry| entry.model.clone())
    }

    /// Merge `patch` into the entry for `key`, creating it if needed.
    ///
    /// A trace in the patch replaces any previous one; model fields are
    /// last-write-wins.
    pub fn upsert(&self, key: &str, patch: SessionPatch) {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(SessionEntry::new);

        if let Some(trace) = patch.trace {
            entry.trace = Some(trace);
        }
        if patch.model_id.is_some() {
            entry.model.id = patch.model_id;
        }
        if patch.model_name.is_some() {
            entry.model.name = patch.model_name;
        }
        entry.open_span_count += patch.spans_opened;
        entry.last_seen = Instant::now();
    }

    /// Remove a session, returning its record if it had a trace.
    pub fn remove(&self, key: &str) -> Option<SessionRecord> {
        self.entries()
            .remove(key)
            .and_then(|entry| entry.record())
    }

    /// Remove every session, returning those with a live trace.
    pub fn drain(&self) -> Vec<(SessionKey, SessionRecord)> {
        self.entries()
            .drain()
            .filter_map(|(key, entry)| entry.record().map(|record| (key, record)))
            .collect()
    }

    /// Remove sessions untouched for longer than `ttl`.
    ///
    /// Sessions whose gate is currently held are skipped.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<(SessionKey, SessionRecord)> {
        let mut entries = self.entries();
        let stale: Vec<SessionKey> = entries
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > ttl && entry.gate.try_lock().is_ok())
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                let record = entries.remove(&key).and_then(|entry| entry.record());
                record.map(|record| (key, record))
            })
            .collect()
    }

    /// Number of sessions with a live trace.
    pub fn len(&self) -> usize {
        self.entries()
            .values()
            .filter(|entry| entry.trace.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries, counting sessions that have no trace yet.
    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }
}
