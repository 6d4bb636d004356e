// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation length guard.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::TurnLimitConfig;
use crate::error::FilterError;
use crate::pipeline::{pipeline_matches, Filter};
use crate::types::{count_role, ChatBody, UserInfo};

/// Rejects requests once a conversation has too many user turns.
///
/// Only callers whose role is in `target_user_roles` are limited.
#[derive(Debug, Clone)]
pub struct TurnLimitFilter {
    config: TurnLimitConfig,
}

impl TurnLimitFilter {
    pub const NAME: &'static str = "Conversation Turn Limit Filter";

    pub fn new(config: TurnLimitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TurnLimitConfig {
        &self.config
    }

    fn is_targeted(&self, user: Option<&UserInfo>) -> bool {
        let role = user.and_then(|u| u.role.as_deref());
        role.is_some_and(|role| self.config.target_user_roles.iter().any(|r| r == role))
    }
}

impl Default for TurnLimitFilter {
    fn default() -> Self {
        Self::new(TurnLimitConfig::default())
    }
}

#[async_trait]
impl Filter for TurnLimitFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn applies_to(&self, model: Option<&str>) -> bool {
        pipeline_matches(&self.config.pipelines, model)
    }

    async fn on_startup(&self) {
        info!(max_turns = self.config.max_turns, "Turn limit filter started");
    }

    async fn inlet(
        &self,
        body: ChatBody,
        user: Option<&UserInfo>,
    ) -> Result<ChatBody, FilterError> {
        if !self.is_targeted(user) {
            return Ok(body);
        }

        let turns = count_role(body.messages(), "user");
        debug!(turns, max_turns = self.config.max_turns, "Checking turn limit");
        if turns > self.config.max_turns {
            return Err(FilterError::TurnLimitExceeded {
                max_turns: self.config.max_turns,
            });
        }
        Ok(body)
    }
}
