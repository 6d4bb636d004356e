// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Filter trait and the pipeline that runs filters in priority order.
//!
//! Filters sit between the chat front end and the model backend. Each one
//! sees the request body on the way in (`inlet`) and the response body on the
//! way out (`outlet`), and may rewrite or reject it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FilterError;
use crate::types::{ChatBody, UserInfo};

/// Pipeline id that matches every model.
pub const ALL_PIPELINES: &str = "*";

/// Whether a filter configured for `pipelines` applies to `model`.
pub fn pipeline_matches(pipelines: &[String], model: Option<&str>) -> bool {
    pipelines
        .iter()
        .any(|p| p == ALL_PIPELINES || Some(p.as_str()) == model)
}

/// A request/response filter.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the filter runs for requests to `model`.
    fn applies_to(&self, _model: Option<&str>) -> bool {
        true
    }

    async fn on_startup(&self) {}

    async fn on_shutdown(&self) {}

    /// Process a request body before it reaches the model.
    async fn inlet(
        &self,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError>;

    /// Process a response body before it reaches the user.
    async fn outlet(
        &self,
        body: ChatBody,
        _user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        Ok(body)
    }
}

/// Ordered set of filters.
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, keeping filters sorted by priority.
    ///
    /// Filters with equal priority keep their insertion order. Priorities are
    /// read again on every run, so a filter whose priority changes after a
    /// config reload moves to its new place.
    pub fn add(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
        self.filters.sort_by_key(|f| f.priority());
    }

    /// Builder-style [`add`](Self::add).
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.add(filter);
        self
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn ordered(&self) -> Vec<&Arc<dyn Filter>> {
        let mut filters: Vec<_> = self.filters.iter().collect();
        filters.sort_by_key(|f| f.priority());
        filters
    }

    pub async fn startup(&self) {
        for filter in self.ordered() {
            filter.on_startup().await;
        }
    }

    pub async fn shutdown(&self) {
        for filter in self.ordered() {
            filter.on_shutdown().await;
        }
    }

    /// Run every applicable inlet in order, stopping at the first error.
    pub async fn inlet(
        &self,
        mut body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        for filter in self.ordered() {
            if filter.applies_to(body.model()) {
                body = filter.inlet(body, user).await?;
            }
        }
        Ok(body)
    }

    /// Run every applicable outlet in order, stopping at the first error.
    pub async fn outlet(
        &self,
        mut body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        for filter in self.ordered() {
            if filter.applies_to(body.model()) {
                body = filter.outlet(body, user).await?;
            }
        }
        Ok(body)
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("filters", &self.names())
            .finish()
    }
}
