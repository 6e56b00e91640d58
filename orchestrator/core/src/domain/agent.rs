// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! One admitted unit of work: a prompt executed by an external LLM CLI
//! against a scenario of the shared source tree.
//!
//! ## Lifecycle
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `pending` | row and locks exist, no subprocess yet |
//! | `running` | subprocess started, PID recorded |
//! | `completed` | subprocess exited 0 |
//! | `failed` | non-zero exit, admission rollback or orphan sweep |
//! | `timeout` | subprocess killed at its deadline |
//! | `stopped` | user-initiated termination |
//!
//! The last four are terminal and terminal status never changes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent identity, status and persistence projections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of hex characters kept from the prompt digest.
pub const PROMPT_HASH_LEN: usize = 16;

const AGENT_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Short opaque identifier (12 hex characters of a v4 UUID).
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..AGENT_ID_LEN].to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Stopped,
}

impl AgentStatus {
    pub const ACTIVE: [AgentStatus; 2] = [AgentStatus::Pending, AgentStatus::Running];
    pub const TERMINAL: [AgentStatus; 4] = [
        AgentStatus::Completed,
        AgentStatus::Failed,
        AgentStatus::Timeout,
        AgentStatus::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Timeout => "timeout",
            AgentStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Pending | AgentStatus::Running)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AgentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AgentStatus::Pending),
            "running" => Ok(AgentStatus::Running),
            "completed" => Ok(AgentStatus::Completed),
            "failed" => Ok(AgentStatus::Failed),
            "timeout" => Ok(AgentStatus::Timeout),
            "stopped" => Ok(AgentStatus::Stopped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Persisted agent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub scenario: String,
    pub scope: Vec<String>,
    pub phases: Vec<String>,
    pub model: String,
    pub prompt: String,
    pub prompt_hash: String,
    pub prompt_index: i32,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Builds the pending row the repository persists on admission.
    pub fn pending(input: &CreateAgentInput, id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            idempotency_key: input
                .idempotency_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            scenario: input.scenario.clone(),
            scope: input.scope.clone(),
            phases: input.phases.clone(),
            model: input.model.clone(),
            prompt: input.prompt.clone(),
            prompt_hash: prompt_hash(&input.prompt),
            prompt_index: input.prompt_index,
            status: AgentStatus::Pending,
            session_id: None,
            pid: None,
            hostname: None,
            output: None,
            error: None,
            started_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update using the same rules as the SQL repository.
    ///
    /// Returns `true` when a field changed.
    pub fn apply(&mut self, update: &AgentUpdate, now: DateTime<Utc>) -> bool {
        if update.is_empty() {
            return false;
        }
        if let Some(status) = update.status {
            if self.status.is_active() {
                self.status = status;
                if status.is_terminal() {
                    self.completed_at = Some(now);
                    self.pid = None;
                } else {
                    self.completed_at = None;
                }
            }
        }
        if let Some(session_id) = &update.session_id {
            self.session_id = Some(session_id.clone());
        }
        if let Some(pid) = update.pid {
            if self.status.is_active() {
                self.pid = Some(pid);
            }
        }
        if let Some(hostname) = &update.hostname {
            self.hostname = Some(hostname.clone());
        }
        if let Some(output) = &update.output {
            self.output = Some(output.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        self.updated_at = now;
        true
    }
}

/// First sixteen hex characters of the SHA-256 digest of `prompt`.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(PROMPT_HASH_LEN);
    encoded
}

/// Admission request for a single prompt.
#[derive(Debug, Clone, Default)]
pub struct CreateAgentInput {
    pub id: Option<AgentId>,
    pub idempotency_key: Option<String>,
    pub scenario: String,
    pub scope: Vec<String>,
    pub phases: Vec<String>,
    pub model: String,
    pub prompt: String,
    pub prompt_index: i32,
}

/// Partial update; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentUpdate {
    pub status: Option<AgentStatus>,
    pub session_id: Option<String>,
    pub pid: Option<i32>,
    pub hostname: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl AgentUpdate {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.session_id.is_none()
            && self.pid.is_none()
            && self.hostname.is_none()
            && self.output.is_none()
            && self.error.is_none()
    }
}

/// Listing filter. An empty `statuses` list means any status.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub scenario: Option<String>,
    pub statuses: Vec<AgentStatus>,
    pub active_only: bool,
    pub older_than: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AgentFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    pub fn active_in(scenario: impl Into<String>) -> Self {
        Self {
            scenario: Some(scenario.into()),
            active_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        if let Some(scenario) = &self.scenario {
            if &agent.scenario != scenario {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&agent.status) {
            return false;
        }
        if self.active_only && !agent.is_active() {
            return false;
        }
        if let Some(cutoff) = self.older_than {
            if agent.started_at >= cutoff {
                return false;
            }
        }
        true
    }
}
