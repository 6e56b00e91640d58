// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spawn intents: one idempotency record per client-supplied key.

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnIntentStatus {
    Pending,
    Completed,
    Failed,
}

impl SpawnIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnIntentStatus::Pending => "pending",
            SpawnIntentStatus::Completed => "completed",
            SpawnIntentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SpawnIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpawnIntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SpawnIntentStatus::Pending),
            "completed" => Ok(SpawnIntentStatus::Completed),
            "failed" => Ok(SpawnIntentStatus::Failed),
            other => Err(format!("unknown spawn intent status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnIntent {
    pub key: String,
    pub scenario: String,
    pub scope: Vec<String>,
    /// Raw status as stored; unknown values classify as a retry.
    pub status: String,
    pub agent_id: Option<AgentId>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SpawnIntent {
    pub fn parsed_status(&self) -> Option<SpawnIntentStatus> {
        self.status.parse().ok()
    }
}

/// What the spawn pipeline does with an acquired intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyAction {
    /// First request with this key.
    Proceed,
    /// A completed request exists; replay its stored payload.
    ReturnCached,
    /// A request with this key is still in flight.
    Conflict,
    /// The earlier attempt failed (or is unreadable); run it again.
    Retry,
}

pub fn classify_idempotency_action(is_new: bool, intent: &SpawnIntent) -> IdempotencyAction {
    if is_new {
        return IdempotencyAction::Proceed;
    }
    match intent.parsed_status() {
        Some(SpawnIntentStatus::Completed) => IdempotencyAction::ReturnCached,
        Some(SpawnIntentStatus::Pending) => IdempotencyAction::Conflict,
        Some(SpawnIntentStatus::Failed) | None => IdempotencyAction::Retry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(status: &str) -> SpawnIntent {
        let now = Utc::now();
        SpawnIntent {
            key: "k".to_string(),
            scenario: "s".to_string(),
            scope: vec![],
            status: status.to_string(),
            agent_id: None,
            result: None,
            created_at: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_idempotency_actions() {
        assert_eq!(classify_idempotency_action(true, &intent("pending")), IdempotencyAction::Proceed);
        assert_eq!(classify_idempotency_action(false, &intent("completed")), IdempotencyAction::ReturnCached);
        assert_eq!(classify_idempotency_action(false, &intent("pending")), IdempotencyAction::Conflict);
        assert_eq!(classify_idempotency_action(false, &intent("failed")), IdempotencyAction::Retry);
        assert_eq!(classify_idempotency_action(false, &intent("garbled")), IdempotencyAction::Retry);
    }
}
