// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::repository::RepositoryError;
use crate::domain::scope::ConflictDetail;
use std::time::Duration;

/// Errors raised by the coordinator and the spawn pipeline.
///
/// Callers never inspect the message; `classify_error` maps every variant
/// to a stable failure code.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("operation canceled")]
    Cancelled,

    #[error("operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("{}", scope_conflict_message(.0))]
    ScopeConflict(Vec<ConflictDetail>),

    #[error("duplicate agent: identical prompt already running (agent {0})")]
    DuplicateAgent(AgentId),

    #[error("agent {id} is not running (status: {status})")]
    NotRunning { id: AgentId, status: AgentStatus },

    #[error("capacity exceeded: {active} active agents (max {max})")]
    CapacityExceeded { active: usize, max: u32 },

    #[error("failed to acquire lock: {0}")]
    LockAcquisition(String),

    #[error("spawn request with idempotency key {0} is already in flight")]
    IdempotencyInFlight(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("failed to start agent process: {0}")]
    ProcessStart(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CoordinatorError {
    pub fn conflicts(&self) -> &[ConflictDetail] {
        match self {
            CoordinatorError::ScopeConflict(conflicts) => conflicts,
            _ => &[],
        }
    }
}

fn scope_conflict_message(conflicts: &[ConflictDetail]) -> String {
    match conflicts.first() {
        Some(first) => format!(
            "scope conflict: path {} overlaps {} locked by agent {} ({} conflicting path(s))",
            first.path,
            first.locked_by.path,
            first.locked_by.agent_id,
            conflicts.len()
        ),
        None => "scope conflict".to_string(),
    }
}
