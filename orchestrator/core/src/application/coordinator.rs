// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordinator Service
//!
//! Admits agents, owns their scope locks and supervises their subprocesses.
//! The repository is the source of truth; the only process-local state is
//! the runtime map from agent id to the cancellation token and process
//! handle of agents launched by this process.
//!
//! # Responsibilities
//!
//! - Orphan reconciliation on start
//! - Retention sweep on an interval
//! - Admission: capacity, scope conflicts, duplicate prompts, lock acquisition
//! - Launch, heartbeat and exit handling for agent subprocesses
//! - Stop / stop-all
//!
//! Every store call is bounded by `CoordinatorConfig::store_timeout`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Collaborators:** `CoordinationRepository`, `ExecutionProvider`, host seams

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::agent::{prompt_hash, Agent, AgentFilter, AgentId, AgentStatus, AgentUpdate, CreateAgentInput};
use crate::domain::config::CoordinatorConfig;
use crate::domain::degradation::{
    decide_on_heartbeat_failure, decide_on_orphan_cleanup_failure, decide_on_process_failure,
};
use crate::domain::error::CoordinatorError;
use crate::domain::failure::FailureInfo;
use crate::domain::file_operation::{FileOperation, NewFileOperation};
use crate::domain::host::{Clock, EnvironmentProvider, ProcessChecker};
use crate::domain::provider::ExecutionProvider;
use crate::domain::repository::{CoordinationRepository, RepositoryError};
use crate::domain::scope::{decide_scope_expansion, ConflictDetail, ScopeLock};
use crate::infrastructure::host::{OsEnvironment, OsProcessChecker, SystemClock};
use crate::infrastructure::process::{self, ExitKind, OsProcessHandle, ProcessOutcome, OUTPUT_LIMIT_BYTES};

/// Characters of stderr kept in an agent's error column.
const STDERR_TAIL_CHARS: usize = 2000;

/// Run `fut` against the store with a deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, RepositoryError>>,
) -> Result<T, CoordinatorError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CoordinatorError::DeadlineExceeded(limit)),
    }
}

/// Clock, liveness probe and environment the coordinator runs against.
#[derive(Clone)]
pub struct HostSeams {
    pub clock: Arc<dyn Clock>,
    pub processes: Arc<dyn ProcessChecker>,
    pub env: Arc<dyn EnvironmentProvider>,
}

impl HostSeams {
    pub fn system() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            processes: Arc::new(OsProcessChecker),
            env: Arc::new(OsEnvironment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanStatus {
    Alive,
    Orphaned { reason: String },
}

/// Decide whether an active agent found in the store still has a live
/// subprocess behind it.
pub fn classify_agent_orphan_status(
    agent: &Agent,
    local_hostname: &str,
    processes: &dyn ProcessChecker,
) -> OrphanStatus {
    let Some(pid) = agent.pid else {
        return OrphanStatus::Orphaned {
            reason: "server restarted while agent was active".to_string(),
        };
    };
    if let Some(host) = agent.hostname.as_deref() {
        if host != local_hostname {
            return OrphanStatus::Orphaned {
                reason: format!("agent was started on host {host}, which no longer supervises it"),
            };
        }
    }
    if processes.is_alive(pid) {
        OrphanStatus::Alive
    } else {
        OrphanStatus::Orphaned {
            reason: format!("process {pid} no longer running"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    pub checked: usize,
    pub alive: usize,
    pub orphaned: Vec<AgentId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub agents_deleted: u64,
    pub intents_deleted: u64,
    pub sessions_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAllReport {
    pub stopped: Vec<AgentId>,
    pub failed: Vec<AgentId>,
}

struct RuntimeEntry {
    cancel: CancellationToken,
    handle: OsProcessHandle,
}

impl RuntimeEntry {
    fn terminate(&self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.kill() {
            warn!(error = %e, pid = ?self.handle.pid(), "Failed to kill agent process");
        }
    }
}

pub struct CoordinatorService {
    repo: Arc<dyn CoordinationRepository>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    processes: Arc<dyn ProcessChecker>,
    hostname: String,
    runtime: Mutex<HashMap<AgentId, RuntimeEntry>>,
    shutdown: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl CoordinatorService {
    pub fn new(repo: Arc<dyn CoordinationRepository>, config: CoordinatorConfig, seams: HostSeams) -> Self {
        let hostname = seams.env.hostname();
        Self {
            repo,
            config,
            clock: seams.clock,
            processes: seams.processes,
            hostname,
            runtime: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn CoordinationRepository> {
        Arc::clone(&self.repo)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    async fn store<T>(&self, fut: impl Future<Output = Result<T, RepositoryError>>) -> Result<T, CoordinatorError> {
        bounded(self.config.store_timeout(), fut).await
    }

    fn lock_expiry(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now() + chrono::Duration::minutes(self.config.lock_timeout_minutes as i64)
    }

    /// Reconcile orphans, then start the retention loop.
    pub async fn start(self: &Arc<Self>) -> OrphanReport {
        let report = self.reconcile_orphans().await;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.cleanup_loop().await });
        self.background.lock().push(handle);
        info!(
            hostname = %self.hostname,
            checked = report.checked,
            orphaned = report.orphaned.len(),
            "Coordinator started"
        );
        report
    }

    /// Fail every active agent that no longer has a live subprocess.
    ///
    /// Must run before the first admission: a pending agent without a pid
    /// that this process is still launching would otherwise look orphaned.
    pub async fn reconcile_orphans(&self) -> OrphanReport {
        let active = match self.store(self.repo.list_agents(&AgentFilter::active())).await {
            Ok(agents) => agents,
            Err(e) => {
                let decision = decide_on_orphan_cleanup_failure(&e.failure_info());
                warn!(error = %e, reason = %decision.reason, "Orphan scan skipped");
                return OrphanReport::default();
            }
        };

        let mut report = OrphanReport {
            checked: active.len(),
            ..Default::default()
        };
        for agent in active {
            if self.runtime.lock().contains_key(&agent.id) {
                report.alive += 1;
                continue;
            }
            match classify_agent_orphan_status(&agent, &self.hostname, self.processes.as_ref()) {
                OrphanStatus::Alive => report.alive += 1,
                OrphanStatus::Orphaned { reason } => {
                    let update = AgentUpdate {
                        status: Some(AgentStatus::Failed),
                        error: Some(reason.clone()),
                        ..Default::default()
                    };
                    match self.update_status(&agent.id, update).await {
                        Ok(_) => {
                            info!(agent_id = %agent.id, %reason, "Marked orphaned agent as failed");
                            report.orphaned.push(agent.id.clone());
                        }
                        Err(e) => {
                            let decision = decide_on_orphan_cleanup_failure(&e.failure_info());
                            warn!(agent_id = %agent.id, error = %e, reason = %decision.reason, "Failed to clean up orphan");
                        }
                    }
                }
            }
        }
        report
    }

    async fn cleanup_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.cleanup_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cleanup().await;
                }
            }
        }
        debug!("Cleanup loop stopped");
    }

    /// One retention pass. Each step is independent; failures are logged.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let cutoff = self.clock.now() - self.config.retention();

        match self.store(self.repo.delete_agents_older_than(cutoff)).await {
            Ok(n) => report.agents_deleted = n,
            Err(e) => warn!(error = %e, "Retention sweep of agents failed"),
        }
        match self.store(self.repo.cleanup_spawn_intents()).await {
            Ok(n) => report.intents_deleted = n,
            Err(e) => warn!(error = %e, "Expired spawn intent cleanup failed"),
        }
        match self.store(self.repo.cleanup_expired_spawn_sessions()).await {
            Ok(n) => report.sessions_deleted = n,
            Err(e) => warn!(error = %e, "Expired spawn session cleanup failed"),
        }

        if report != CleanupReport::default() {
            info!(
                agents = report.agents_deleted,
                intents = report.intents_deleted,
                sessions = report.sessions_deleted,
                "Retention cleanup removed rows"
            );
        }
        report
    }

    /// Admit one prompt: capacity, conflicts, duplicates, then row + locks.
    pub async fn register(&self, input: CreateAgentInput) -> Result<Agent, CoordinatorError> {
        let id = input.id.clone().unwrap_or_else(AgentId::generate);
        let expansion = decide_scope_expansion(&input.scope);
        if expansion.was_expanded {
            debug!(agent_id = %id, added = ?expansion.added, "{}", expansion.reason);
        }

        let active = self.store(self.repo.list_agents(&AgentFilter::active())).await?;
        let max = self.config.max_concurrent_agents;
        if active.len() >= max as usize {
            return Err(CoordinatorError::CapacityExceeded {
                active: active.len(),
                max,
            });
        }

        if !expansion.expanded.is_empty() {
            let conflicts = self
                .store(self.repo.check_conflicts(&input.scenario, &expansion.expanded))
                .await?;
            if !conflicts.is_empty() {
                return Err(CoordinatorError::ScopeConflict(conflicts));
            }
        }

        let hash = prompt_hash(&input.prompt);
        if let Some(existing) = active
            .iter()
            .find(|a| a.scenario == input.scenario && a.prompt_hash == hash)
        {
            return Err(CoordinatorError::DuplicateAgent(existing.id.clone()));
        }

        let pending = Agent::pending(&input, id, self.clock.now());
        let agent = self.store(self.repo.create_agent(&pending)).await?;

        // A concurrent admission of the same prompt may have slipped past the
        // duplicate check; the older row wins.
        if let Some(winner) = self.duplicate_winner(&agent).await? {
            self.rollback_registration(&agent.id).await;
            return Err(CoordinatorError::DuplicateAgent(winner));
        }

        if !expansion.expanded.is_empty() {
            let acquired = self
                .store(
                    self.repo
                        .acquire_locks(&agent.id, &agent.scenario, &expansion.expanded, self.lock_expiry()),
                )
                .await;
            if let Err(e) = acquired {
                warn!(agent_id = %agent.id, error = %e, "Lock acquisition failed; rolling back admission");
                self.rollback_registration(&agent.id).await;
                return Err(e);
            }
        }

        info!(
            agent_id = %agent.id,
            scenario = %agent.scenario,
            scope = ?agent.scope,
            prompt_hash = %agent.prompt_hash,
            "Agent registered"
        );
        Ok(agent)
    }

    async fn duplicate_winner(&self, agent: &Agent) -> Result<Option<AgentId>, CoordinatorError> {
        let peers = self
            .store(self.repo.list_agents(&AgentFilter::active_in(agent.scenario.clone())))
            .await?;
        Ok(peers
            .into_iter()
            .filter(|p| p.id != agent.id && p.prompt_hash == agent.prompt_hash)
            .find(|p| (p.created_at, &p.id) < (agent.created_at, &agent.id))
            .map(|p| p.id))
    }

    async fn rollback_registration(&self, id: &AgentId) {
        if let Err(e) = self.store(self.repo.delete_agent(id)).await {
            error!(agent_id = %id, error = %e, "Failed to delete agent during admission rollback");
        }
        if let Err(e) = self.store(self.repo.release_locks(id)).await {
            error!(agent_id = %id, error = %e, "Failed to release locks during admission rollback");
        }
    }

    /// Apply `update`. A terminal result releases locks and ends the
    /// agent's runtime entry, killing its process if one is still running.
    pub async fn update_status(&self, id: &AgentId, update: AgentUpdate) -> Result<Agent, CoordinatorError> {
        let agent = self
            .store(self.repo.update_agent(id, &update))
            .await?
            .ok_or_else(|| CoordinatorError::AgentNotFound(id.clone()))?;

        if agent.status.is_terminal() {
            if let Err(e) = self.store(self.repo.release_locks(id)).await {
                warn!(agent_id = %id, error = %e, "Failed to release locks for terminal agent");
            }
            if let Some(entry) = self.runtime.lock().remove(id) {
                entry.terminate();
            }
            debug!(agent_id = %id, status = %agent.status, "Agent reached terminal status");
        }
        Ok(agent)
    }

    /// Stop an active agent. Stopping an agent that is not active fails.
    pub async fn stop(&self, id: &AgentId) -> Result<Agent, CoordinatorError> {
        self.stop_with_reason(id, "stopped by user").await
    }

    async fn stop_with_reason(&self, id: &AgentId, reason: &str) -> Result<Agent, CoordinatorError> {
        let agent = self.get_agent(id).await?;
        if !agent.is_active() {
            return Err(CoordinatorError::NotRunning {
                id: id.clone(),
                status: agent.status,
            });
        }

        if let Some(entry) = self.runtime.lock().remove(id) {
            entry.terminate();
        }

        let update = AgentUpdate {
            status: Some(AgentStatus::Stopped),
            error: Some(reason.to_string()),
            ..Default::default()
        };
        let stopped = self.update_status(id, update).await?;
        info!(agent_id = %id, status = %stopped.status, "Agent stopped");
        Ok(stopped)
    }

    pub async fn stop_all(&self) -> Result<StopAllReport, CoordinatorError> {
        let active = self.store(self.repo.list_agents(&AgentFilter::active())).await?;
        let mut report = StopAllReport::default();
        for agent in active {
            match self.stop(&agent.id).await {
                Ok(_) => report.stopped.push(agent.id),
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "Failed to stop agent");
                    report.failed.push(agent.id);
                }
            }
        }
        Ok(report)
    }

    /// Push every lock of the agent to `now + lock_timeout`.
    pub async fn renew_locks(&self, id: &AgentId) -> Result<u64, CoordinatorError> {
        self.store(self.repo.renew_locks(id, self.lock_expiry())).await
    }

    /// Start the agent's subprocess and hand it to a supervision task.
    ///
    /// The agent moves to `running` with its pid and hostname recorded. When
    /// the process cannot be started the agent is failed and the error
    /// returned.
    pub async fn launch(
        self: &Arc<Self>,
        agent: &Agent,
        command: Command,
        timeout: Duration,
        provider: Arc<dyn ExecutionProvider>,
    ) -> Result<Agent, CoordinatorError> {
        let running = match process::start(command) {
            Ok(running) => running,
            Err(e) => {
                let failure = FailureInfo::process_start_failed(e.to_string());
                let decision = decide_on_process_failure(&failure);
                failure.log("agent launch");
                let update = AgentUpdate {
                    status: Some(AgentStatus::Failed),
                    error: Some(decision.warning_for_user),
                    ..Default::default()
                };
                if let Err(update_err) = self.update_status(&agent.id, update).await {
                    warn!(agent_id = %agent.id, error = %update_err, "Failed to record start failure");
                }
                return Err(CoordinatorError::ProcessStart(e.to_string()));
            }
        };

        let handle = running.handle.clone();
        let cancel = CancellationToken::new();
        self.runtime.lock().insert(
            agent.id.clone(),
            RuntimeEntry {
                cancel: cancel.clone(),
                handle: handle.clone(),
            },
        );

        let update = AgentUpdate {
            status: Some(AgentStatus::Running),
            pid: handle.pid(),
            hostname: Some(self.hostname.clone()),
            ..Default::default()
        };
        let launched = match self.update_status(&agent.id, update).await {
            Ok(agent) => agent,
            Err(e) => {
                if let Some(entry) = self.runtime.lock().remove(&agent.id) {
                    entry.terminate();
                }
                drop(running);
                let update = AgentUpdate {
                    status: Some(AgentStatus::Failed),
                    error: Some(format!("could not record running state: {e}")),
                    ..Default::default()
                };
                if let Err(update_err) = self.update_status(&agent.id, update).await {
                    warn!(agent_id = %agent.id, error = %update_err, "Failed to record launch failure");
                }
                return Err(e);
            }
        };

        info!(
            agent_id = %agent.id,
            pid = ?handle.pid(),
            provider = provider.name(),
            timeout_secs = timeout.as_secs(),
            "Agent launched"
        );

        let heartbeat_stop = cancel.child_token();
        let this = Arc::clone(self);
        let id = agent.id.clone();
        let hb_stop = heartbeat_stop.clone();
        tokio::spawn(async move { this.heartbeat(id, hb_stop).await });

        let this = Arc::clone(self);
        let id = agent.id.clone();
        tokio::spawn(async move {
            let outcome = process::supervise(running, timeout, cancel, OUTPUT_LIMIT_BYTES).await;
            heartbeat_stop.cancel();
            this.finish(&id, timeout, outcome, provider.as_ref()).await;
        });

        Ok(launched)
    }

    async fn heartbeat(self: Arc<Self>, id: AgentId, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut consecutive = 0u32;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.renew_locks(&id).await {
                Ok(renewed) => {
                    consecutive = 0;
                    debug!(agent_id = %id, renewed, "Scope locks renewed");
                }
                Err(e) => {
                    consecutive += 1;
                    let decision =
                        decide_on_heartbeat_failure(&e.failure_info(), consecutive, self.config.max_heartbeat_failures);
                    if decision.should_continue {
                        warn!(agent_id = %id, error = %e, reason = %decision.reason, "Heartbeat failed");
                        continue;
                    }
                    error!(agent_id = %id, error = %e, reason = %decision.reason, "Heartbeat gave up; failing agent");
                    let update = AgentUpdate {
                        status: Some(AgentStatus::Failed),
                        error: Some(decision.warning_for_user),
                        ..Default::default()
                    };
                    if let Err(update_err) = self.update_status(&id, update).await {
                        warn!(agent_id = %id, error = %update_err, "Failed to record heartbeat failure");
                    }
                    break;
                }
            }
        }
    }

    async fn finish(
        &self,
        id: &AgentId,
        timeout: Duration,
        outcome: io::Result<ProcessOutcome>,
        provider: &dyn ExecutionProvider,
    ) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let failure = FailureInfo::process_exit_failed(None, e.to_string());
                failure.log("agent supervision");
                let update = AgentUpdate {
                    status: Some(AgentStatus::Failed),
                    error: Some(failure.message),
                    ..Default::default()
                };
                if let Err(update_err) = self.update_status(id, update).await {
                    warn!(agent_id = %id, error = %update_err, "Failed to record supervision failure");
                }
                return;
            }
        };

        let mut update = AgentUpdate {
            session_id: provider.extract_session_id(&outcome.stdout),
            output: Some(outcome.stdout.clone()).filter(|o| !o.is_empty()),
            ..Default::default()
        };

        match outcome.kind {
            ExitKind::Exited if outcome.succeeded() => {
                update.status = Some(AgentStatus::Completed);
            }
            ExitKind::Exited => {
                let tail = outcome.stderr_tail(STDERR_TAIL_CHARS);
                let failure = FailureInfo::process_exit_failed(outcome.exit_code(), tail.clone());
                let decision = decide_on_process_failure(&failure);
                failure.log("agent exit");
                update.status = Some(AgentStatus::Failed);
                update.error = Some(if tail.is_empty() {
                    format!("{}. {}", failure.message, decision.warning_for_user)
                } else {
                    format!("{}: {}", failure.message, tail)
                });
            }
            ExitKind::TimedOut => {
                let failure = FailureInfo::process_timeout(timeout.as_secs());
                let decision = decide_on_process_failure(&failure);
                failure.log("agent deadline");
                update.status = Some(AgentStatus::Timeout);
                update.error = Some(format!("{}. {}", failure.message, decision.warning_for_user));
            }
            ExitKind::Cancelled => {
                // Whoever cancelled already set the status.
                debug!(agent_id = %id, "Agent run cancelled");
            }
        }

        if update.is_empty() {
            return;
        }
        match self.update_status(id, update).await {
            Ok(agent) => info!(
                agent_id = %id,
                status = %agent.status,
                exit_code = ?outcome.exit_code(),
                truncated_bytes = outcome.stdout_truncated,
                "Agent finished"
            ),
            Err(e) => warn!(agent_id = %id, error = %e, "Failed to record agent exit"),
        }
    }

    pub async fn get_agent(&self, id: &AgentId) -> Result<Agent, CoordinatorError> {
        self.store(self.repo.get_agent(id))
            .await?
            .ok_or_else(|| CoordinatorError::AgentNotFound(id.clone()))
    }

    pub async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>, CoordinatorError> {
        self.store(self.repo.list_agents(filter)).await
    }

    pub async fn active_locks(&self, scenario: Option<&str>) -> Result<Vec<ScopeLock>, CoordinatorError> {
        match scenario {
            Some(scenario) => self.store(self.repo.get_locks_for_scenario(scenario)).await,
            None => self.store(self.repo.get_active_locks()).await,
        }
    }

    /// Conflicts a registration of `scope` would hit right now, after
    /// expansion with the shared dependency files.
    pub async fn preview_conflicts(
        &self,
        scenario: &str,
        scope: &[String],
    ) -> Result<Vec<ConflictDetail>, CoordinatorError> {
        let expansion = decide_scope_expansion(scope);
        self.store(self.repo.check_conflicts(scenario, &expansion.expanded)).await
    }

    /// Delete a terminal agent together with its locks and file operations.
    pub async fn delete_agent(&self, id: &AgentId) -> Result<(), CoordinatorError> {
        let agent = self.get_agent(id).await?;
        if agent.is_active() {
            return Err(CoordinatorError::Validation(format!(
                "agent {id} is {}; stop it before deleting",
                agent.status
            )));
        }
        if !self.store(self.repo.delete_agent(id)).await? {
            return Err(CoordinatorError::AgentNotFound(id.clone()));
        }
        info!(agent_id = %id, "Agent deleted");
        Ok(())
    }

    pub async fn record_file_operation(&self, mut op: NewFileOperation) -> Result<FileOperation, CoordinatorError> {
        let agent = self.get_agent(&op.agent_id).await?;
        if op.scenario.trim().is_empty() {
            op.scenario = agent.scenario.clone();
        } else if op.scenario != agent.scenario {
            return Err(CoordinatorError::Validation(format!(
                "agent {} belongs to scenario {}, not {}",
                agent.id, agent.scenario, op.scenario
            )));
        }
        let recorded = self.store(self.repo.record_file_operation(&op)).await?;
        debug!(agent_id = %op.agent_id, operation = %recorded.operation, path = %recorded.path, "File operation recorded");
        Ok(recorded)
    }

    pub async fn file_operations_for_agent(
        &self,
        id: &AgentId,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, CoordinatorError> {
        self.store(self.repo.list_file_operations_for_agent(id, limit)).await
    }

    pub async fn file_operations_for_scenario(
        &self,
        scenario: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileOperation>, CoordinatorError> {
        self.store(self.repo.list_file_operations_for_scenario(scenario, limit)).await
    }

    /// Agents with a live subprocess owned by this process.
    pub fn running_count(&self) -> usize {
        self.runtime.lock().len()
    }

    /// Stop background loops and every agent this process launched.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let owned: Vec<AgentId> = self.runtime.lock().keys().cloned().collect();
        for id in owned {
            if let Err(e) = self.stop_with_reason(&id, "coordinator shutting down").await {
                warn!(agent_id = %id, error = %e, "Failed to stop agent during shutdown");
            }
        }

        let handles: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Coordinator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FixedLiveness(bool);

    impl ProcessChecker for FixedLiveness {
        fn is_alive(&self, _pid: i32) -> bool {
            self.0
        }
    }

    fn agent(pid: Option<i32>, hostname: Option<&str>) -> Agent {
        let input = CreateAgentInput {
            scenario: "billing".to_string(),
            model: "sonnet".to_string(),
            prompt: "fix".to_string(),
            ..Default::default()
        };
        let mut agent = Agent::pending(&input, AgentId::new("a1"), Utc::now());
        agent.pid = pid;
        agent.hostname = hostname.map(str::to_string);
        agent
    }

    #[test]
    fn test_orphan_without_pid() {
        let status = classify_agent_orphan_status(&agent(None, None), "here", &FixedLiveness(true));
        assert_eq!(
            status,
            OrphanStatus::Orphaned {
                reason: "server restarted while agent was active".to_string()
            }
        );
    }

    #[test]
    fn test_orphan_on_other_host() {
        let status = classify_agent_orphan_status(&agent(Some(10), Some("elsewhere")), "here", &FixedLiveness(true));
        assert!(matches!(status, OrphanStatus::Orphaned { .. }));
    }

    #[test]
    fn test_local_liveness_decides() {
        let alive = classify_agent_orphan_status(&agent(Some(10), Some("here")), "here", &FixedLiveness(true));
        assert_eq!(alive, OrphanStatus::Alive);

        let dead = classify_agent_orphan_status(&agent(Some(10), Some("here")), "here", &FixedLiveness(false));
        assert_eq!(
            dead,
            OrphanStatus::Orphaned {
                reason: "process 10 no longer running".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bounded_store_call_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RepositoryError>(())
        };
        let err = bounded(Duration::from_millis(20), slow).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::DeadlineExceeded(_)));
        assert_eq!(
            err.failure_info().code,
            crate::domain::failure::FailureCode::DatabaseTimeout
        );
    }
}
