// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Coordination Repository
//!
//! Production implementation of every coordination repository trait, backed
//! by the schema in `orchestrator/core/migrations` via `sqlx`.
//!
//! Lock acquisition is the store-level single-owner guarantee: inside one
//! transaction it takes a per-scenario advisory lock, checks for active
//! overlapping locks held by other agents and inserts all rows, or none.
//! Status updates stamp `completed_at` and clear `pid` in the same
//! statement, and never move a terminal row.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentFilter, AgentId, AgentStatus, AgentUpdate};
use crate::domain::file_operation::{FileOperation, NewFileOperation};
use crate::domain::repository::{
    AgentRepository, FileOperationRepository, RepositoryError, ScopeLockRepository, SpawnIntentRepository,
    SpawnSessionRepository,
};
use crate::domain::scope::{find_conflicts, paths_overlap, ConflictDetail, ScopeLock};
use crate::domain::spawn_intent::{SpawnIntent, SpawnIntentStatus};
use crate::domain::spawn_session::{
    session_conflicts, NewSpawnSession, SessionConflict, SpawnSession, SpawnSessionStatus,
};

const AGENT_COLUMNS: &str = "id, idempotency_key, scenario, scope, phases, model, prompt, prompt_hash, \
     prompt_index, status, session_id, pid, hostname, output, error, started_at, completed_at, \
     created_at, updated_at";

const LOCK_COLUMNS: &str = "agent_id, scenario, path, acquired_at, renewed_at, expires_at";

const INTENT_COLUMNS: &str = "key, scenario, scope, status, agent_id, result, created_at, expires_at";

const SESSION_COLUMNS: &str =
    "id, user_identifier, scenario, scope, agent_ids, status, created_at, last_activity_at, expires_at";

const FILE_OPERATION_COLUMNS: &str =
    "id, agent_id, scenario, operation, path, content_before, content_after, content_hash, recorded_at";

pub struct PostgresCoordinationRepository {
    pool: PgPool,
}

impl PostgresCoordinationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn serialization(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Serialization(e.to_string())
}

fn agent_from_row(row: &PgRow) -> Result<Agent, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(Agent {
        id: AgentId(row.try_get("id")?),
        idempotency_key: row.try_get("idempotency_key")?,
        scenario: row.try_get("scenario")?,
        scope: row.try_get("scope")?,
        phases: row.try_get("phases")?,
        model: row.try_get("model")?,
        prompt: row.try_get("prompt")?,
        prompt_hash: row.try_get("prompt_hash")?,
        prompt_index: row.try_get("prompt_index")?,
        status: status.parse::<AgentStatus>().map_err(serialization)?,
        session_id: row.try_get("session_id")?,
        pid: row.try_get("pid")?,
        hostname: row.try_get("hostname")?,
        output: row.try_get("output")?,
        error: row.try_get("error")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn lock_from_row(row: &PgRow) -> Result<ScopeLock, RepositoryError> {
    Ok(ScopeLock {
        agent_id: AgentId(row.try_get("agent_id")?),
        scenario: row.try_get("scenario")?,
        path: row.try_get("path")?,
        acquired_at: row.try_get("acquired_at")?,
        renewed_at: row.try_get("renewed_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn intent_from_row(row: &PgRow) -> Result<SpawnIntent, RepositoryError> {
    let agent_id: Option<String> = row.try_get("agent_id")?;
    Ok(SpawnIntent {
        key: row.try_get("key")?,
        scenario: row.try_get("scenario")?,
        scope: row.try_get("scope")?,
        status: row.try_get("status")?,
        agent_id: agent_id.map(AgentId),
        result: row.try_get("result")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<SpawnSession, RepositoryError> {
    let status: String = row.try_get("status")?;
    let agent_ids: Vec<String> = row.try_get("agent_ids")?;
    Ok(SpawnSession {
        id: row.try_get("id")?,
        user_identifier: row.try_get("user_identifier")?,
        scenario: row.try_get("scenario")?,
        scope: row.try_get("scope")?,
        agent_ids: agent_ids.into_iter().map(AgentId).collect(),
        status: status.parse().map_err(serialization)?,
        created_at: row.try_get("created_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn file_operation_from_row(row: &PgRow) -> Result<FileOperation, RepositoryError> {
    let operation: String = row.try_get("operation")?;
    Ok(FileOperation {
        id: row.try_get("id")?,
        agent_id: AgentId(row.try_get("agent_id")?),
        scenario: row.try_get("scenario")?,
        operation: operation.parse().map_err(serialization)?,
        path: row.try_get("path")?,
        content_before: row.try_get("content_before")?,
        content_after: row.try_get("content_after")?,
        content_hash: row.try_get("content_hash")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn seconds(ttl: Duration) -> f64 {
    ttl.num_milliseconds() as f64 / 1000.0
}

fn status_names(statuses: &[AgentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl AgentRepository for PostgresCoordinationRepository {
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO agents (
                id, idempotency_key, scenario, scope, phases, model, prompt,
                prompt_hash, prompt_index, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {AGENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(agent.id.as_str())
            .bind(agent.idempotency_key.as_deref())
            .bind(&agent.scenario)
            .bind(&agent.scope)
            .bind(&agent.phases)
            .bind(&agent.model)
            .bind(&agent.prompt)
            .bind(&agent.prompt_hash)
            .bind(agent.prompt_index)
            .bind(agent.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        agent_from_row(&row)
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(&self.pool).await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn get_agent_by_idempotency_key(&self, key: &str) -> Result<Option<Agent>, RepositoryError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE idempotency_key = $1");
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn update_agent(&self, id: &AgentId, update: &AgentUpdate) -> Result<Option<Agent>, RepositoryError> {
        if update.is_empty() {
            return self.get_agent(id).await;
        }
        // SET expressions see the pre-update row, so `status IN (...)` below
        // always refers to the current status.
        let sql = format!(
            r#"
            UPDATE agents SET
                status = CASE
                    WHEN $2::text IS NOT NULL AND status IN ('pending', 'running') THEN $2
                    ELSE status END,
                completed_at = CASE
                    WHEN $2::text IS NOT NULL AND status IN ('pending', 'running') THEN
                        CASE WHEN $2 IN ('completed', 'failed', 'timeout', 'stopped') THEN NOW() ELSE NULL END
                    ELSE completed_at END,
                pid = CASE
                    WHEN $2::text IS NOT NULL AND status IN ('pending', 'running')
                         AND $2 IN ('completed', 'failed', 'timeout', 'stopped') THEN NULL
                    WHEN $4::integer IS NOT NULL AND status IN ('pending', 'running') THEN $4
                    ELSE pid END,
                session_id = COALESCE($3, session_id),
                hostname = COALESCE($5, hostname),
                output = COALESCE($6, output),
                error = COALESCE($7, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {AGENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.session_id.as_deref())
            .bind(update.pid)
            .bind(update.hostname.as_deref())
            .bind(update.output.as_deref())
            .bind(update.error.as_deref())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {AGENT_COLUMNS}
            FROM agents
            WHERE ($1::text IS NULL OR scenario = $1)
              AND (cardinality($2::text[]) = 0 OR status = ANY($2))
              AND (NOT $3 OR status IN ('pending', 'running'))
              AND ($4::timestamptz IS NULL OR started_at < $4)
            ORDER BY started_at DESC, id ASC
            LIMIT $5
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.scenario.as_deref())
            .bind(status_names(&filter.statuses))
            .bind(filter.active_only)
            .bind(filter.older_than)
            .bind(filter.limit.filter(|l| *l > 0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(agent_from_row).collect()
    }

    async fn delete_agent(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_agents_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE completed_at IS NOT NULL AND completed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ScopeLockRepository for PostgresCoordinationRepository {
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(scenario)
            .execute(&mut *tx)
            .await?;

        let held = sqlx::query(
            r#"
            SELECT agent_id, path FROM scope_locks
            WHERE scenario = $1 AND agent_id <> $2 AND expires_at > NOW()
            "#,
        )
        .bind(scenario)
        .bind(agent_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        for row in &held {
            let held_path: String = row.try_get("path")?;
            if paths.iter().any(|p| paths_overlap(p, &held_path)) {
                let owner: String = row.try_get("agent_id")?;
                // Dropping the transaction rolls it back.
                return Err(RepositoryError::LockConflict(format!(
                    "path {held_path} held by agent {owner} in scenario {scenario}"
                )));
            }
        }

        let sql = format!(
            r#"
            INSERT INTO scope_locks (agent_id, scenario, path, acquired_at, renewed_at, expires_at)
            SELECT $1, $2, p, NOW(), NOW(), $4 FROM unnest($3::text[]) AS p
            ON CONFLICT (agent_id, scenario, path)
            DO UPDATE SET expires_at = EXCLUDED.expires_at, renewed_at = NOW()
            RETURNING {LOCK_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id.as_str())
            .bind(scenario)
            .bind(paths)
            .bind(expires_at)
            .fetch_all(&mut *tx)
            .await?;
        let locks = rows.iter().map(lock_from_row).collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(locks)
    }

    async fn release_locks(&self, agent_id: &AgentId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM scope_locks WHERE agent_id = $1")
            .bind(agent_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn renew_locks(&self, agent_id: &AgentId, expires_at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE scope_locks SET expires_at = $2, renewed_at = NOW() WHERE agent_id = $1")
            .bind(agent_id.as_str())
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_active_locks(&self) -> Result<Vec<ScopeLock>, RepositoryError> {
        let sql = format!(
            "SELECT {LOCK_COLUMNS} FROM scope_locks WHERE expires_at > NOW() ORDER BY acquired_at DESC, path"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(lock_from_row).collect()
    }

    async fn get_locks_for_scenario(&self, scenario: &str) -> Result<Vec<ScopeLock>, RepositoryError> {
        let sql = format!(
            "SELECT {LOCK_COLUMNS} FROM scope_locks WHERE scenario = $1 AND expires_at > NOW() ORDER BY acquired_at DESC, path"
        );
        let rows = sqlx::query(&sql).bind(scenario).fetch_all(&self.pool).await?;
        rows.iter().map(lock_from_row).collect()
    }

    async fn get_locks_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ScopeLock>, RepositoryError> {
        let sql = format!("SELECT {LOCK_COLUMNS} FROM scope_locks WHERE agent_id = $1 ORDER BY path");
        let rows = sqlx::query(&sql).bind(agent_id.as_str()).fetch_all(&self.pool).await?;
        rows.iter().map(lock_from_row).collect()
    }

    async fn check_conflicts(&self, scenario: &str, paths: &[String]) -> Result<Vec<ConflictDetail>, RepositoryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT l.agent_id, l.scenario, l.path, l.acquired_at, l.renewed_at, l.expires_at,
                   a.started_at
            FROM scope_locks l
            JOIN agents a ON a.id = l.agent_id
            WHERE l.scenario = $1 AND l.expires_at > NOW()
            ORDER BY l.path
            "#,
        )
        .bind(scenario)
        .fetch_all(&self.pool)
        .await?;

        let mut started: HashMap<AgentId, DateTime<Utc>> = HashMap::new();
        let mut locks = Vec::with_capacity(rows.len());
        for row in &rows {
            let lock = lock_from_row(row)?;
            started.insert(lock.agent_id.clone(), row.try_get("started_at")?);
            locks.push(lock);
        }
        Ok(find_conflicts(paths, &locks, |lock| {
            started.get(&lock.agent_id).copied().unwrap_or(lock.acquired_at)
        }))
    }
}

#[async_trait]
impl SpawnIntentRepository for PostgresCoordinationRepository {
    async fn acquire_spawn_intent(
        &self,
        key: &str,
        scenario: &str,
        scope: &[String],
        ttl: Duration,
    ) -> Result<(SpawnIntent, bool), RepositoryError> {
        sqlx::query("DELETE FROM spawn_intents WHERE key = $1 AND expires_at <= NOW()")
            .bind(key)
            .execute(&self.pool)
            .await?;

        let sql = format!(
            r#"
            INSERT INTO spawn_intents (key, scenario, scope, status, created_at, expires_at)
            VALUES ($1, $2, $3, 'pending', NOW(), NOW() + make_interval(secs => $4))
            ON CONFLICT (key) DO NOTHING
            RETURNING {INTENT_COLUMNS}
            "#
        );
        let inserted = sqlx::query(&sql)
            .bind(key)
            .bind(scenario)
            .bind(scope)
            .bind(seconds(ttl))
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = inserted {
            return Ok((intent_from_row(&row)?, true));
        }

        let sql = format!("SELECT {INTENT_COLUMNS} FROM spawn_intents WHERE key = $1");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("spawn intent {key}")))?;
        Ok((intent_from_row(&row)?, false))
    }

    async fn update_spawn_intent(
        &self,
        key: &str,
        agent_id: Option<&AgentId>,
        status: SpawnIntentStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE spawn_intents SET
                status = $2,
                agent_id = COALESCE($3, agent_id),
                result = COALESCE($4, result)
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(status.as_str())
        .bind(agent_id.map(|id| id.as_str()))
        .bind(result)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("spawn intent {key}")));
        }
        Ok(())
    }

    async fn reset_spawn_intent(&self, key: &str, ttl: Duration) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE spawn_intents SET
                status = 'pending', agent_id = NULL, result = NULL,
                expires_at = NOW() + make_interval(secs => $2)
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(seconds(ttl))
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("spawn intent {key}")));
        }
        Ok(())
    }

    async fn cleanup_spawn_intents(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM spawn_intents WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SpawnSessionRepository for PostgresCoordinationRepository {
    async fn create_spawn_session(&self, session: &NewSpawnSession) -> Result<SpawnSession, RepositoryError> {
        let agent_ids: Vec<String> = session.agent_ids.iter().map(|id| id.0.clone()).collect();
        let sql = format!(
            r#"
            INSERT INTO spawn_sessions (
                id, user_identifier, scenario, scope, agent_ids, status,
                created_at, last_activity_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, 'active', NOW(), NOW(), NOW() + make_interval(secs => $6))
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&session.user_identifier)
            .bind(&session.scenario)
            .bind(&session.scope)
            .bind(agent_ids)
            .bind(seconds(session.ttl))
            .fetch_one(&self.pool)
            .await?;
        session_from_row(&row)
    }

    async fn get_active_spawn_sessions(&self, user_identifier: &str) -> Result<Vec<SpawnSession>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM spawn_sessions
            WHERE user_identifier = $1 AND status = 'active' AND expires_at > NOW()
            ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query(&sql).bind(user_identifier).fetch_all(&self.pool).await?;
        rows.iter().map(session_from_row).collect()
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
        let updated = sqlx::query("UPDATE spawn_sessions SET status = $2, last_activity_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("spawn session {id}")));
        }
        Ok(())
    }

    async fn clear_spawn_sessions(&self, user_identifier: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE spawn_sessions SET status = 'cleared', last_activity_at = NOW()
            WHERE user_identifier = $1 AND status = 'active'
            "#,
        )
        .bind(user_identifier)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired_spawn_sessions(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM spawn_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FileOperationRepository for PostgresCoordinationRepository {
    async fn record_file_operation(&self, op: &NewFileOperation) -> Result<FileOperation, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO file_operations (
                agent_id, scenario, operation, path, content_before, content_after, content_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FILE_OPERATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(op.agent_id.as_str())
            .bind(&op.scenario)
            .bind(op.operation.as_str())
            .bind(&op.path)
            .bind(op.content_before.as_deref())
            .bind(op.content_after.as_deref())
            .bind(op.content_hash.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    RepositoryError::NotFound(format!("agent {}", op.agent_id))
                }
                other => RepositoryError::from(other),
            })?;
        file_operation_from_row(&row)
    }

    async fn list_file_operations_for_agent(
        &self,
        agent_id: &AgentId,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError> {
        let sql = format!(
            "SELECT {FILE_OPERATION_COLUMNS} FROM file_operations WHERE agent_id = $1 \
             ORDER BY recorded_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id.as_str())
            .bind(limit.filter(|l| *l > 0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(file_operation_from_row).collect()
    }

    async fn list_file_operations_for_scenario(
        &self,
        scenario: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, RepositoryError> {
        let sql = format!(
            "SELECT {FILE_OPERATION_COLUMNS} FROM file_operations WHERE scenario = $1 \
             ORDER BY recorded_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(scenario)
            .bind(limit.filter(|l| *l > 0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(file_operation_from_row).collect()
    }
}
