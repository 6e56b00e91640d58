// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the coordination aggregates. Interfaces live in
//! the domain layer and are implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentRepository` | `Agent` | `InMemoryCoordinationRepository`, `PostgresCoordinationRepository` |
//! | `ScopeLockRepository` | `ScopeLock` | same |
//! | `SpawnIntentRepository` | `SpawnIntent` | same |
//! | `SpawnSessionRepository` | `SpawnSession` | same |
//! | `FileOperationRepository` | `FileOperation` | same |
//!
//! The store is the single source of truth for agent status, locks,
//! intents and sessions. Every method is a future; dropping it abandons the
//! call, and callers bound latency with `tokio::time::timeout`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentFilter, AgentId, AgentUpdate};
use crate::domain::file_operation::{FileOperation, NewFileOperation};
use crate::domain::scope::{ConflictDetail, ScopeLock};
use crate::domain::spawn_intent::{SpawnIntent, SpawnIntentStatus};
use crate::domain::spawn_session::{NewSpawnSession, SessionConflict, SpawnSession, SpawnSessionStatus};

/// Storage backend selection
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a pending agent; timestamps are assigned by the store.
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, RepositoryError>;

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;

    async fn get_agent_by_idempotency_key(&self, key: &str) -> Result<Option<Agent>, RepositoryError>;

    /// Partial update. A terminal status stamps `completed_at` and clears
    /// `pid` in the same statement; a terminal row never changes status.
    async fn update_agent(&self, id: &AgentId, update: &AgentUpdate) -> Result<Option<Agent>, RepositoryError>;

    /// Newest first by `started_at`.
    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>, RepositoryError>;

    /// Delete one agent; its locks go with it.
    async fn delete_agent(&self, id: &AgentId) -> Result<bool, RepositoryError>;

    /// Delete terminal agents whose `completed_at` is before `cutoff`.
    async fn delete_agents_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ScopeLockRepository: Send + Sync {
    /// All-or-nothing insert of one lock per path.
    ///
    /// Fails with [`RepositoryError::LockConflict`] when another agent holds
    /// an active overlapping lock in the scenario.
    async fn acquire_locks(
        &self,
        agent_id: &AgentId,
        scenario: &str,
        paths: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<ScopeLock>, RepositoryError>;

    async fn release_locks(&self, agent_id: &AgentId) -> Result<u64, RepositoryError>;

    /// Pushes every lock of the agent to `expires_at` in one statement.
    async fn renew_locks(&self, agent_id: &AgentId, expires_at: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn get_active_locks(&self) -> Result<Vec<ScopeLock>, RepositoryError>;

    async fn get_locks_for_scenario(&self, scenario: &str) -> Result<Vec<ScopeLock>, RepositoryError>;

    async fn get_locks_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ScopeLock>, RepositoryError>;

    async fn check_conflicts(&self, scenario: &str, paths: &[String]) -> Result<Vec<ConflictDetail>, RepositoryError>;
}

#[async_trait]
pub trait SpawnIntentRepository: Send + Sync {
    /// Insert-or-return in one round trip. Exactly one concurrent caller per
    /// key observes `is_new = true`.
    async fn acquire_spawn_intent(
        &self,
        key: &str,
        scenario: &str,
        scope: &[String],
        ttl: Duration,
    ) -> Result<(SpawnIntent, bool), RepositoryError>;

    async fn update_spawn_intent(
        &self,
        key: &str,
        agent_id: Option<&AgentId>,
        status: SpawnIntentStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<(), RepositoryError>;

    /// Put a failed intent back to pending before a retry.
    async fn reset_spawn_intent(&self, key: &str, ttl: Duration) -> Result<(), RepositoryError>;

    async fn cleanup_spawn_intents(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SpawnSessionRepository: Send + Sync {
    async fn create_spawn_session(&self, session: &NewSpawnSession) -> Result<SpawnSession, RepositoryError>;

    async fn get_active_spawn_sessions(&self, user_identifier: &str) -> Result<Vec<SpawnSession>, RepositoryError>;

    async fn check_spawn_session_conflicts(
        &self,
        user_identifier: &str,
        scenario: &str,
        scope: &[String],
    ) -> Result<Vec<SessionConflict>, RepositoryError>;

    async fn update_spawn_session_status(&self, id: Uuid, status: SpawnSessionStatus) -> Result<(), RepositoryError>;

    async fn clear_spawn_sessions(&self, user_identifier: &str) -> Result<u64, RepositoryError>;

    async fn cleanup_expired_spawn_sessions(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait FileOperationRepository: Send + Sync {
    async fn record_file_operation(&self, op: &NewFileOperation) -> Result<FileOperation, RepositoryError>;

    async fn list_file_operations_for_agent(
        &self,
        agent_id: &AgentId,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError>;

    async fn list_file_operations_for_scenario(
        &self,
        scenario: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError>;
}

/// Everything the coordinator needs from the store.
pub trait CoordinationRepository:
    AgentRepository + ScopeLockRepository + SpawnIntentRepository + SpawnSessionRepository + FileOperationRepository
{
}

impl<T> CoordinationRepository for T where
    T: AgentRepository + ScopeLockRepository + SpawnIntentRepository + SpawnSessionRepository + FileOperationRepository
{
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("failed to acquire lock: {0}")]
    LockConflict(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database timeout: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => RepositoryError::Timeout(err.to_string()),
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                RepositoryError::Connection(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Duplicate(db.to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
