// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spawn sessions
//!
//! Server-side record of what a principal (API key, IP or user id) is
//! currently spawning, used to catch the same user launching overlapping
//! batches from two tabs or browsers before admission.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Session model and overlap check

use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::scope::paths_overlap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnSessionStatus {
    Active,
    Completed,
    Failed,
    Cleared,
}

impl SpawnSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnSessionStatus::Active => "active",
            SpawnSessionStatus::Completed => "completed",
            SpawnSessionStatus::Failed => "failed",
            SpawnSessionStatus::Cleared => "cleared",
        }
    }
}

impl fmt::Display for SpawnSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpawnSessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SpawnSessionStatus::Active),
            "completed" => Ok(SpawnSessionStatus::Completed),
            "failed" => Ok(SpawnSessionStatus::Failed),
            "cleared" => Ok(SpawnSessionStatus::Cleared),
            other => Err(format!("unknown spawn session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnSession {
    pub id: Uuid,
    pub user_identifier: String,
    pub scenario: String,
    pub scope: Vec<String>,
    pub agent_ids: Vec<AgentId>,
    pub status: SpawnSessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SpawnSession {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SpawnSessionStatus::Active && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewSpawnSession {
    pub user_identifier: String,
    pub scenario: String,
    pub scope: Vec<String>,
    pub agent_ids: Vec<AgentId>,
    pub ttl: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConflict {
    pub session_id: Uuid,
    pub scenario: String,
    pub requested_path: Option<String>,
    pub existing_path: Option<String>,
    pub agent_ids: Vec<AgentId>,
}

/// Overlap between a requested scope and an existing session's scope.
///
/// An empty scope on either side stands for the whole scenario and
/// therefore conflicts with everything.
pub fn session_conflicts(session: &SpawnSession, requested: &[String]) -> Vec<SessionConflict> {
    let conflict = |requested_path: Option<&String>, existing_path: Option<&String>| SessionConflict {
        session_id: session.id,
        scenario: session.scenario.clone(),
        requested_path: requested_path.cloned(),
        existing_path: existing_path.cloned(),
        agent_ids: session.agent_ids.clone(),
    };

    if requested.is_empty() || session.scope.is_empty() {
        return vec![conflict(requested.first(), session.scope.first())];
    }

    let mut conflicts = Vec::new();
    for path in requested {
        for existing in &session.scope {
            if paths_overlap(path, existing) {
                conflicts.push(conflict(Some(path), Some(existing)));
            }
        }
    }
    conflicts
}

/// Status a session settles into once none of its agents is active, or
/// `None` while one still is. Agents already deleted count as neither.
pub fn settled_status(agents: &[Option<AgentStatus>]) -> Option<SpawnSessionStatus> {
    if agents.iter().flatten().any(|status| status.is_active()) {
        return None;
    }
    let failed = agents
        .iter()
        .flatten()
        .any(|status| matches!(status, AgentStatus::Failed | AgentStatus::Timeout | AgentStatus::Stopped));
    Some(if failed {
        SpawnSessionStatus::Failed
    } else {
        SpawnSessionStatus::Completed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(scope: &[&str]) -> SpawnSession {
        let now = Utc::now();
        SpawnSession {
            id: Uuid::new_v4(),
            user_identifier: "key-1".to_string(),
            scenario: "s".to_string(),
            scope: scope.iter().map(|s| s.to_string()).collect(),
            agent_ids: vec![AgentId::new("a1")],
            status: SpawnSessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: now + chrono::Duration::minutes(30),
        }
    }

    #[test]
    fn test_empty_scope_conflicts_with_everything() {
        assert_eq!(session_conflicts(&session(&[]), &["api".to_string()]).len(), 1);
        assert_eq!(session_conflicts(&session(&["web"]), &[]).len(), 1);
    }

    #[test]
    fn test_disjoint_scopes_do_not_conflict() {
        assert!(session_conflicts(&session(&["web"]), &["api".to_string()]).is_empty());
        assert_eq!(session_conflicts(&session(&["api/v1"]), &["api".to_string()]).len(), 1);
    }

    #[test]
    fn test_settled_status() {
        use AgentStatus::*;
        assert_eq!(settled_status(&[Some(Completed), Some(Running)]), None);
        assert_eq!(settled_status(&[Some(Pending)]), None);
        assert_eq!(settled_status(&[Some(Completed), None]), Some(SpawnSessionStatus::Completed));
        assert_eq!(settled_status(&[Some(Completed), Some(Timeout)]), Some(SpawnSessionStatus::Failed));
        assert_eq!(settled_status(&[]), Some(SpawnSessionStatus::Completed));
    }
}
