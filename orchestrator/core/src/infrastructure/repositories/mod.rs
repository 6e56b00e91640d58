// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the coordination repository traits
//! defined in `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve coordination aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresCoordinationRepository** - production store (sqlx)
//! - **InMemoryCoordinationRepository** - dev mode and tests; every call
//!   runs under one mutex, so each method is atomic, and time comes from an
//!   injected `Clock`
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use test_genie_core::domain::repository::CoordinationRepository;
//! use test_genie_core::infrastructure::repositories::InMemoryCoordinationRepository;
//!
//! let repo: Arc<dyn CoordinationRepository> = Arc::new(InMemoryCoordinationRepository::new());
//! ```

pub mod postgres;

pub use postgres::PostgresCoordinationRepository;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentFilter, AgentId, AgentUpdate};
use crate::domain::file_operation::{FileOperation, NewFileOperation};
use crate::domain::host::Clock;
use crate::domain::repository::{
    AgentRepository, FileOperationRepository, RepositoryError, ScopeLockRepository, SpawnIntentRepository,
    SpawnSessionRepository,
};
use crate::domain::scope::{find_conflicts, paths_overlap, ConflictDetail, ScopeLock};
use crate::domain::spawn_intent::{SpawnIntent, SpawnIntentStatus};
use crate::domain::spawn_session::{
    session_conflicts, NewSpawnSession, SessionConflict, SpawnSession, SpawnSessionStatus,
};
use crate::infrastructure::host::SystemClock;

#[derive(Default)]
struct State {
    agents: HashMap<AgentId, Agent>,
    locks: Vec<ScopeLock>,
    intents: HashMap<String, SpawnIntent>,
    sessions: HashMap<Uuid, SpawnSession>,
    file_operations: Vec<FileOperation>,
    next_file_operation_id: i64,
}

impl State {
    fn remove_agent(&mut self, id: &AgentId) -> bool {
        let removed = self.agents.remove(id).is_some();
        if removed {
            self.locks.retain(|l| &l.agent_id != id);
            self.file_operations.retain(|op| &op.agent_id != id);
        }
        removed
    }

    fn agent_started_at(&self, lock: &ScopeLock) -> DateTime<Utc> {
        self.agents
            .get(&lock.agent_id)
            .map(|a| a.started_at)
            .unwrap_or(lock.acquired_at)
    }
}

#[derive(Clone)]
pub struct InMemoryCoordinationRepository {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCoordinationRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for InMemoryCoordinationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRepository for InMemoryCoordinationRepository {
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        if state.agents.contains_key(&agent.id) {
            return Err(RepositoryError::Duplicate(format!("agent {}", agent.id)));
        }
        if let Some(key) = &agent.idempotency_key {
            if state.agents.values().any(|a| a.idempotency_key.as_ref() == Some(key)) {
                return Err(RepositoryError::Duplicate(format!("idempotency key {key}")));
            }
        }
        let mut stored = agent.clone();
        stored.started_at = now;
        stored.created_at = now;
        stored.updated_at = now;
        state.agents.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.state.lock().agents.get(id).cloned())
    }

    async fn get_agent_by_idempotency_key(&self, key: &str) -> Result<Option<Agent>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .agents
            .values()
            .find(|a| a.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_agent(&self, id: &AgentId, update: &AgentUpdate) -> Result<Option<Agent>, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let Some(agent) = state.agents.get_mut(id) else {
            return Ok(None);
        };
        agent.apply(update, now);
        Ok(Some(agent.clone()))
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>, RepositoryError> {
        let state = self.state.lock();
        let mut agents: Vec<Agent> = state.agents.values().filter(|a| filter.matches(a)).cloned().collect();
        agents.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            agents.truncate(limit as usize);
        }
        Ok(agents)
    }

    async fn delete_agent(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().remove_agent(id))
    }

    async fn delete_agents_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        let expired: Vec<AgentId> = state
            .agents
            .values()
            .filter(|a| a.completed_at.is_some_and(|c| c < cutoff))
            .map(|a| a.id.clone())
            .collect();
        for id in &expired {
            state.remove_agent(id);
        }
        Ok(expired.len() as u64)
    }
}

#[async_trait]
impl ScopeLockRepository for InMemoryCoordinationRepository {
    async fn acquire_locks(
        &self,
        agent_id: &AgentId,
        scenario: &str,
        paths: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<ScopeLock>, RepositoryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.now();
        let mut state = self.state.lock();
        if !state.agents.contains_key(agent_id) {
            return Err(RepositoryError::NotFound(format!("agent {agent_id}")));
        }

        let blocking = state.locks.iter().find(|lock| {
            &lock.agent_id != agent_id
                && lock.scenario == scenario
                && lock.is_active_at(now)
                && paths.iter().any(|p| paths_overlap(p, &lock.path))
        });
        if let Some(lock) = blocking {
            return Err(RepositoryError::LockConflict(format!(
                "path {} held by agent {} in scenario {scenario}",
                lock.path, lock.agent_id
            )));
        }

        let mut acquired = Vec::with_capacity(paths.len());
        for path in paths {
            state
                .locks
                .retain(|l| !(&l.agent_id == agent_id && l.scenario == scenario && &l.path == path));
            let lock = ScopeLock {
                agent_id: agent_id.clone(),
                scenario: scenario.to_string(),
                path: path.clone(),
                acquired_at: now,
                renewed_at: now,
                expires_at,
            };
            state.locks.push(lock.clone());
            acquired.push(lock);
        }
        Ok(acquired)
    }

    async fn release_locks(&self, agent_id: &AgentId) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        let before = state.locks.len();
        state.locks.retain(|l| &l.agent_id != agent_id);
        Ok((before - state.locks.len()) as u64)
    }

    async fn renew_locks(&self, agent_id: &AgentId, expires_at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let mut renewed = 0;
        for lock in state.locks.iter_mut().filter(|l| &l.agent_id == agent_id) {
            lock.expires_at = expires_at;
            lock.renewed_at = now;
            renewed += 1;
        }
        Ok(renewed)
    }

    async fn get_active_locks(&self) -> Result<Vec<ScopeLock>, RepositoryError> {
        let now = self.now();
        let state = self.state.lock();
        let mut locks: Vec<ScopeLock> = state.locks.iter().filter(|l| l.is_active_at(now)).cloned().collect();
        locks.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then_with(|| a.path.cmp(&b.path)));
        Ok(locks)
    }

    async fn get_locks_for_scenario(&self, scenario: &str) -> Result<Vec<ScopeLock>, RepositoryError> {
        let mut locks = self.get_active_locks().await?;
        locks.retain(|l| l.scenario == scenario);
        Ok(locks)
    }

    async fn get_locks_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ScopeLock>, RepositoryError> {
        let state = self.state.lock();
        Ok(state.locks.iter().filter(|l| &l.agent_id == agent_id).cloned().collect())
    }

    async fn check_conflicts(&self, scenario: &str, paths: &[String]) -> Result<Vec<ConflictDetail>, RepositoryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.now();
        let state = self.state.lock();
        let active: Vec<ScopeLock> = state
            .locks
            .iter()
            .filter(|l| l.scenario == scenario && l.is_active_at(now))
            .cloned()
            .collect();
        Ok(find_conflicts(paths, &active, |lock| state.agent_started_at(lock)))
    }
}

#[async_trait]
impl SpawnIntentRepository for InMemoryCoordinationRepository {
    async fn acquire_spawn_intent(
        &self,
        key: &str,
        scenario: &str,
        scope: &[String],
        ttl: Duration,
    ) -> Result<(SpawnIntent, bool), RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        if let Some(existing) = state.intents.get(key) {
            if existing.expires_at > now {
                return Ok((existing.clone(), false));
            }
        }
        let intent = SpawnIntent {
            key: key.to_string(),
            scenario: scenario.to_string(),
            scope: scope.to_vec(),
            status: SpawnIntentStatus::Pending.as_str().to_string(),
            agent_id: None,
            result: None,
            created_at: now,
            expires_at: now + ttl,
        };
        state.intents.insert(key.to_string(), intent.clone());
        Ok((intent, true))
    }

    async fn update_spawn_intent(
        &self,
        key: &str,
        agent_id: Option<&AgentId>,
        status: SpawnIntentStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let intent = state
            .intents
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound(format!("spawn intent {key}")))?;
        intent.status = status.as_str().to_string();
        if let Some(agent_id) = agent_id {
            intent.agent_id = Some(agent_id.clone());
        }
        if let Some(result) = result {
            intent.result = Some(result.clone());
        }
        Ok(())
    }

    async fn reset_spawn_intent(&self, key: &str, ttl: Duration) -> Result<(), RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let intent = state
            .intents
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound(format!("spawn intent {key}")))?;
        intent.status = SpawnIntentStatus::Pending.as_str().to_string();
        intent.agent_id = None;
        intent.result = None;
        intent.expires_at = now + ttl;
        Ok(())
    }

    async fn cleanup_spawn_intents(&self) -> Result<u64, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let before = state.intents.len();
        state.intents.retain(|_, i| i.expires_at > now);
        Ok((before - state.intents.len()) as u64)
    }
}

#[async_trait]
impl SpawnSessionRepository for InMemoryCoordinationRepository {
    async fn create_spawn_session(&self, session: &NewSpawnSession) -> Result<SpawnSession, RepositoryError> {
        let now = self.now();
        let stored = SpawnSession {
            id: Uuid::new_v4(),
            user_identifier: session.user_identifier.clone(),
            scenario: session.scenario.clone(),
            scope: session.scope.clone(),
            agent_ids: session.agent_ids.clone(),
            status: SpawnSessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: now + session.ttl,
        };
        self.state.lock().sessions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_active_spawn_sessions(&self, user_identifier: &str) -> Result<Vec<SpawnSession>, RepositoryError> {
        let now = self.now();
        let state = self.state.lock();
        let mut sessions: Vec<SpawnSession> = state
            .sessions
            .values()
            .filter(|s| s.user_identifier == user_identifier && s.is_active_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn check_spawn_session_conflicts(
        &self,
        user_identifier: &str,
        scenario: &str,
        scope: &[String],
    ) -> Result<Vec<SessionConflict>, RepositoryError> {
        let sessions = self.get_active_spawn_sessions(user_identifier).await?;
        Ok(sessions
            .iter()
            .filter(|s| s.scenario == scenario)
            .flat_map(|s| session_conflicts(s, scope))
            .collect())
    }

    async fn update_spawn_session_status(&self, id: Uuid, status: SpawnSessionStatus) -> Result<(), RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("spawn session {id}")))?;
        session.status = status;
        session.last_activity_at = now;
        Ok(())
    }

    async fn clear_spawn_sessions(&self, user_identifier: &str) -> Result<u64, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let mut cleared = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.user_identifier == user_identifier && s.status == SpawnSessionStatus::Active)
        {
            session.status = SpawnSessionStatus::Cleared;
            session.last_activity_at = now;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn cleanup_expired_spawn_sessions(&self) -> Result<u64, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl FileOperationRepository for InMemoryCoordinationRepository {
    async fn record_file_operation(&self, op: &NewFileOperation) -> Result<FileOperation, RepositoryError> {
        let now = self.now();
        let mut state = self.state.lock();
        if !state.agents.contains_key(&op.agent_id) {
            return Err(RepositoryError::NotFound(format!("agent {}", op.agent_id)));
        }
        state.next_file_operation_id += 1;
        let recorded = FileOperation {
            id: state.next_file_operation_id,
            agent_id: op.agent_id.clone(),
            scenario: op.scenario.clone(),
            operation: op.operation,
            path: op.path.clone(),
            content_before: op.content_before.clone(),
            content_after: op.content_after.clone(),
            content_hash: op.content_hash.clone(),
            recorded_at: now,
        };
        state.file_operations.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_file_operations_for_agent(
        &self,
        agent_id: &AgentId,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError> {
        let state = self.state.lock();
        Ok(newest_first(state.file_operations.iter().filter(|op| &op.agent_id == agent_id), limit))
    }

    async fn list_file_operations_for_scenario(
        &self,
        scenario: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError> {
        let state = self.state.lock();
        Ok(newest_first(state.file_operations.iter().filter(|op| op.scenario == scenario), limit))
    }
}

fn newest_first<'a>(ops: impl Iterator<Item = &'a FileOperation>, limit: Option<i64>) -> Vec<FileOperation> {
    let mut ops: Vec<FileOperation> = ops.cloned().collect();
    ops.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then_with(|| b.id.cmp(&a.id)));
    if let Some(limit) = limit.filter(|l| *l > 0) {
        ops.truncate(limit as usize);
    }
    ops
}
