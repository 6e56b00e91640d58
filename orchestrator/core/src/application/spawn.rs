// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spawn Pipeline
//!
//! End-to-end handling of a spawn request:
//!
//! 1. field validation
//! 2. security validation and scenario lookup
//! 3. idempotency gate
//! 4. spawn-session overlap check for the calling principal
//! 5. per prompt: admission, provider selection, execution config,
//!    containment, command construction and launch
//! 6. spawn-session and idempotency bookkeeping
//!
//! Prompts of one request are admitted in order with bounded concurrency and
//! reported per item. A request in which every prompt fails returns the first
//! failure as its error.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Collaborators:** `CoordinatorService`, `ProviderSelector`,
//!   `SecurityValidator`, `ContainmentProvider`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::coordinator::{bounded, CoordinatorService};
use crate::application::execution_builder::{ExecutionBuilder, ExecutionBuilderInput};
use crate::domain::agent::{Agent, AgentId, AgentStatus, AgentUpdate, CreateAgentInput};
use crate::domain::containment::ContainmentProvider;
use crate::domain::degradation::{
    decide_on_containment_failure, decide_on_registration_failure, decide_on_session_tracking_failure,
};
use crate::domain::error::CoordinatorError;
use crate::domain::failure::{FailureCategory, FailureCode, FailureInfo};
use crate::domain::scope::ConflictDetail;
use crate::domain::security::{SecurityInput, SecurityValidator};
use crate::domain::spawn_intent::{classify_idempotency_action, IdempotencyAction, SpawnIntentStatus};
use crate::domain::spawn_session::{settled_status, NewSpawnSession, SessionConflict, SpawnSession};
use crate::domain::validation::{validate_fields, SpawnRequest, ValidationResult};
use crate::infrastructure::providers::ProviderSelector;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("invalid spawn request: {}", first_message(.0))]
    Validation(ValidationResult),

    #[error("an overlapping spawn is already in progress for this user ({} conflict(s))", .0.len())]
    SessionConflict(Vec<SessionConflict>),

    #[error("no execution provider available: {0}")]
    ProviderUnavailable(String),

    #[error("failed to build execution config: {0}")]
    Build(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

fn first_message(result: &ValidationResult) -> String {
    result
        .first_error()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "unknown error".to_string())
}

impl SpawnError {
    pub fn failure_info(&self) -> FailureInfo {
        match self {
            SpawnError::Validation(result) => FailureInfo::validation(first_message(result)),
            SpawnError::SessionConflict(conflicts) => FailureInfo::new(
                FailureCategory::Conflict,
                FailureCode::ScopeConflict,
                "An overlapping spawn is already in progress for this user",
            )
            .recovery("Wait for it to finish or clear your spawn sessions")
            .details(format!("{} session conflict(s)", conflicts.len())),
            SpawnError::ProviderUnavailable(reason) => FailureInfo::new(
                FailureCategory::Resource,
                FailureCode::ProcessStartFailed,
                "No agent CLI is available on this server",
            )
            .recovery("Install the agent CLI or set TEST_GENIE_CLI_BINARY")
            .details(reason.clone()),
            SpawnError::Build(details) => FailureInfo::validation(format!("Invalid execution settings: {details}")),
            SpawnError::Coordinator(e) => e.failure_info(),
        }
    }

    /// Scope conflicts carried by this error, if any.
    pub fn conflicts(&self) -> &[ConflictDetail] {
        match self {
            SpawnError::Coordinator(e) => e.conflicts(),
            _ => &[],
        }
    }
}

/// Client-facing projection of a launched agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedAgent {
    pub id: AgentId,
    pub prompt_index: i32,
    pub status: AgentStatus,
    pub scenario: String,
    pub scope: Vec<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    pub started_at: DateTime<Utc>,
}

impl From<&Agent> for SpawnedAgent {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            prompt_index: agent.prompt_index,
            status: agent.status,
            scenario: agent.scenario.clone(),
            scope: agent.scope.clone(),
            model: agent.model.clone(),
            pid: agent.pid,
            started_at: agent.started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFailure {
    pub prompt_index: usize,
    pub error: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResponse {
    pub success: bool,
    pub agents: Vec<SpawnedAgent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PromptFailure>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SpawnOutcome {
    Spawned(SpawnResponse),
    /// Replay of an earlier completed request with the same idempotency key.
    Cached(serde_json::Value),
}

struct PromptContext<'a> {
    request: &'a SpawnRequest,
    tools: &'a [String],
    key: Option<&'a str>,
    multi: bool,
}

struct PromptResult {
    index: usize,
    result: Result<Agent, SpawnError>,
    warnings: Vec<String>,
}

pub struct SpawnService {
    coordinator: Arc<CoordinatorService>,
    providers: ProviderSelector,
    security: SecurityValidator,
    containment: Arc<dyn ContainmentProvider>,
}

impl SpawnService {
    pub fn new(
        coordinator: Arc<CoordinatorService>,
        providers: ProviderSelector,
        security: SecurityValidator,
        containment: Arc<dyn ContainmentProvider>,
    ) -> Self {
        Self {
            coordinator,
            providers,
            security,
            containment,
        }
    }

    pub fn coordinator(&self) -> &Arc<CoordinatorService> {
        &self.coordinator
    }

    /// Active sessions of `principal`, after settling those whose agents
    /// have all finished.
    pub async fn active_sessions(&self, principal: &str) -> Result<Vec<SpawnSession>, CoordinatorError> {
        let repo = self.coordinator.repository();
        let timeout = self.coordinator.config().store_timeout();
        let sessions = bounded(timeout, repo.get_active_spawn_sessions(principal)).await?;

        let mut active = Vec::with_capacity(sessions.len());
        for session in sessions {
            let mut statuses = Vec::with_capacity(session.agent_ids.len());
            for id in &session.agent_ids {
                statuses.push(bounded(timeout, repo.get_agent(id)).await?.map(|a| a.status));
            }
            match settled_status(&statuses) {
                Some(status) => {
                    bounded(timeout, repo.update_spawn_session_status(session.id, status)).await?;
                    debug!(session_id = %session.id, %status, "Spawn session settled");
                }
                None => active.push(session),
            }
        }
        Ok(active)
    }

    async fn check_sessions(
        &self,
        principal: &str,
        request: &SpawnRequest,
    ) -> Result<Vec<SessionConflict>, CoordinatorError> {
        self.active_sessions(principal).await?;
        let repo = self.coordinator.repository();
        bounded(
            self.coordinator.config().store_timeout(),
            repo.check_spawn_session_conflicts(principal, &request.scenario, &request.scope),
        )
        .await
    }

    async fn fail_intent(&self, key: Option<&str>) {
        let Some(key) = key else {
            return;
        };
        let repo = self.coordinator.repository();
        let marked = bounded(
            self.coordinator.config().store_timeout(),
            repo.update_spawn_intent(key, None, SpawnIntentStatus::Failed, None),
        )
        .await;
        if let Err(e) = marked {
            warn!(idempotency_key = %key, error = %e, "Failed to mark spawn intent failed");
        }
    }

    /// Mark every active session of `principal` cleared.
    pub async fn clear_sessions(&self, principal: &str) -> Result<u64, CoordinatorError> {
        let repo = self.coordinator.repository();
        let cleared = bounded(self.coordinator.config().store_timeout(), repo.clear_spawn_sessions(principal)).await?;
        info!(principal, cleared, "Spawn sessions cleared");
        Ok(cleared)
    }

    /// Run the full pipeline. `principal` identifies the caller for
    /// spawn-session tracking; `None` skips it.
    pub async fn spawn(&self, principal: Option<&str>, request: SpawnRequest) -> Result<SpawnOutcome, SpawnError> {
        let config = self.coordinator.config();
        let repo = self.coordinator.repository();
        let store_timeout = config.store_timeout();

        let fields = validate_fields(&request, config.max_prompts_per_spawn as usize);
        let mut validation = fields.result;
        let request = fields.request;
        if !request.scenario.is_empty() && !is_plain_name(&request.scenario) {
            validation.add_error(
                "scenario",
                "invalid_scenario",
                "scenario must be a single directory name",
            );
        }
        if !validation.is_valid() {
            return Err(SpawnError::Validation(validation));
        }
        let mut warnings = validation.warnings;

        let scenario_root = config.scenario_root(&request.scenario);
        let security = self.security.validate(SecurityInput {
            skip_permissions: request.skip_permissions,
            allowed_tools: &request.allowed_tools,
            scope: &request.scope,
            prompts: &request.prompts,
            scenario_root: &scenario_root,
        });
        if !security.result.is_valid() {
            return Err(SpawnError::Validation(security.result));
        }
        let scenario_exists = tokio::fs::metadata(&scenario_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !scenario_exists {
            return Err(CoordinatorError::ScenarioNotFound(request.scenario.clone()).into());
        }

        let key = request.idempotency_key.clone();
        if let Some(key) = &key {
            let ttl = config.idempotency_ttl();
            let (intent, is_new) = bounded(
                store_timeout,
                repo.acquire_spawn_intent(key, &request.scenario, &request.scope, ttl),
            )
            .await?;
            match classify_idempotency_action(is_new, &intent) {
                IdempotencyAction::Proceed => {}
                IdempotencyAction::ReturnCached => {
                    info!(idempotency_key = %key, "Replaying cached spawn result");
                    let cached = intent.result.unwrap_or_else(|| {
                        serde_json::json!({ "success": true, "agentId": intent.agent_id })
                    });
                    return Ok(SpawnOutcome::Cached(cached));
                }
                IdempotencyAction::Conflict => {
                    return Err(CoordinatorError::IdempotencyInFlight(key.clone()).into());
                }
                IdempotencyAction::Retry => {
                    info!(idempotency_key = %key, "Retrying previously failed spawn");
                    bounded(store_timeout, repo.reset_spawn_intent(key, ttl)).await?;
                }
            }
        }

        // Replays were answered above, so a session left by the original
        // request cannot reject its own retry.
        if let Some(principal) = principal {
            match self.check_sessions(principal, &request).await {
                Ok(conflicts) if !conflicts.is_empty() => {
                    self.fail_intent(key.as_deref()).await;
                    return Err(SpawnError::SessionConflict(conflicts));
                }
                Ok(_) => {}
                Err(e) => {
                    let decision = decide_on_session_tracking_failure(&e.failure_info());
                    debug!(error = %e, reason = %decision.reason, "Spawn session check skipped");
                }
            }
        }

        let concurrency = request
            .concurrency
            .unwrap_or(config.default_concurrency)
            .clamp(1, config.max_concurrent_agents.max(1)) as usize;
        let ctx = PromptContext {
            request: &request,
            tools: &security.sanitized_tools,
            key: key.as_deref(),
            multi: request.prompts.len() > 1,
        };
        let ctx = &ctx;
        let results: Vec<PromptResult> = stream::iter(request.prompts.clone().into_iter().enumerate())
            .map(move |(index, prompt)| async move { self.spawn_prompt(ctx, index, &prompt).await })
            .buffered(concurrency)
            .collect()
            .await;

        let mut agents = Vec::new();
        let mut failures = Vec::new();
        let mut first_error = None;
        for item in results {
            warnings.extend(item.warnings);
            match item.result {
                Ok(agent) => agents.push(agent),
                Err(e) => {
                    let failure = e.failure_info();
                    failures.push(PromptFailure {
                        prompt_index: item.index,
                        error: failure.to_map(),
                        conflicts: e.conflicts().to_vec(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        if agents.is_empty() {
            self.fail_intent(key.as_deref()).await;
            return Err(first_error.unwrap_or_else(|| SpawnError::Build("no prompts were spawned".to_string())));
        }

        let spawn_session_id = match principal {
            Some(principal) => {
                let session = NewSpawnSession {
                    user_identifier: principal.to_string(),
                    scenario: request.scenario.clone(),
                    scope: request.scope.clone(),
                    agent_ids: agents.iter().map(|a| a.id.clone()).collect(),
                    ttl: config.spawn_session_ttl(),
                };
                match bounded(store_timeout, repo.create_spawn_session(&session)).await {
                    Ok(session) => Some(session.id),
                    Err(e) => {
                        let decision = decide_on_session_tracking_failure(&e.failure_info());
                        debug!(error = %e, reason = %decision.reason, "Spawn session not recorded");
                        None
                    }
                }
            }
            None => None,
        };

        let response = SpawnResponse {
            success: true,
            agents: agents.iter().map(SpawnedAgent::from).collect(),
            failures,
            warnings,
            spawn_session_id,
            idempotency_key: key.clone(),
        };

        if let Some(key) = &key {
            let payload = serde_json::to_value(&response).ok();
            let updated = bounded(
                store_timeout,
                repo.update_spawn_intent(key, Some(&agents[0].id), SpawnIntentStatus::Completed, payload.as_ref()),
            )
            .await;
            if let Err(e) = updated {
                warn!(idempotency_key = %key, error = %e, "Failed to store spawn result");
            }
        }

        info!(
            scenario = %request.scenario,
            spawned = response.agents.len(),
            failed = response.failures.len(),
            "Spawn request handled"
        );
        Ok(SpawnOutcome::Spawned(response))
    }

    async fn spawn_prompt(&self, ctx: &PromptContext<'_>, index: usize, prompt: &str) -> PromptResult {
        let mut warnings = Vec::new();
        let result = self.admit_and_launch(ctx, index, prompt, &mut warnings).await;
        PromptResult {
            index,
            result,
            warnings,
        }
    }

    async fn admit_and_launch(
        &self,
        ctx: &PromptContext<'_>,
        index: usize,
        prompt: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Agent, SpawnError> {
        let config = self.coordinator.config();
        let repo = self.coordinator.repository();
        let request = ctx.request;

        let agent_key = ctx.key.map(|key| {
            if ctx.multi {
                format!("{key}:{index}")
            } else {
                key.to_string()
            }
        });
        if let Some(agent_key) = &agent_key {
            let existing = bounded(config.store_timeout(), repo.get_agent_by_idempotency_key(agent_key)).await?;
            if let Some(existing) = existing {
                if existing.is_active() {
                    debug!(agent_id = %existing.id, "Prompt already running from an earlier attempt");
                    return Ok(existing);
                }
                debug!(agent_id = %existing.id, status = %existing.status, "Replacing agent from failed attempt");
                bounded(config.store_timeout(), repo.delete_agent(&existing.id)).await?;
            }
        }

        let input = CreateAgentInput {
            id: None,
            idempotency_key: agent_key,
            scenario: request.scenario.clone(),
            scope: request.scope.clone(),
            phases: request.phases.clone(),
            model: request.model.clone(),
            prompt: prompt.to_string(),
            prompt_index: index as i32,
        };
        let agent = match self.coordinator.register(input).await {
            Ok(agent) => agent,
            Err(e) => {
                let decision = decide_on_registration_failure(&e.failure_info());
                info!(prompt_index = index, error = %e, reason = %decision.reason, "Prompt not admitted");
                return Err(e.into());
            }
        };

        let selection = self.providers.select_provider().await;
        let Some(provider) = selection.provider else {
            let reason = selection
                .reason
                .unwrap_or_else(|| "no execution provider available".to_string());
            self.fail_agent(&agent.id, &reason).await;
            return Err(SpawnError::ProviderUnavailable(reason));
        };
        if selection.used_fallback {
            warnings.push(format!("Primary agent CLI unavailable; using {}", provider.name()));
        }

        let built = ExecutionBuilder::build(ExecutionBuilderInput {
            agent: &agent,
            request,
            allowed_tools: ctx.tools,
            provider: provider.as_ref(),
            config,
        });
        warnings.extend(built.warnings);
        let mut execution = match built.config {
            Some(execution) if built.success => execution,
            _ => {
                let reason = built.errors.join("; ");
                self.fail_agent(&agent.id, &reason).await;
                return Err(SpawnError::Build(reason));
            }
        };

        if let Err(e) = self.containment.prepare(&mut execution).await {
            let failure = FailureInfo::containment_unavailable(e.to_string());
            let decision = decide_on_containment_failure(&failure);
            failure.log(self.containment.name());
            if !decision.should_continue {
                self.fail_agent(&agent.id, &decision.reason).await;
                return Err(SpawnError::Build(decision.reason));
            }
            warnings.push(decision.warning_for_user);
        }

        let command = match provider.build_command(&execution.to_params()) {
            Ok(command) => command,
            Err(e) => {
                self.fail_agent(&agent.id, &e.to_string()).await;
                return Err(SpawnError::Build(e.to_string()));
            }
        };

        debug!(agent_id = %agent.id, command = %execution.display_command(), "Launching agent");
        let launched = self
            .coordinator
            .launch(&agent, command, execution.timeout(), provider)
            .await?;
        Ok(launched)
    }

    async fn fail_agent(&self, id: &AgentId, reason: &str) {
        let update = AgentUpdate {
            status: Some(AgentStatus::Failed),
            error: Some(reason.to_string()),
            ..Default::default()
        };
        if let Err(e) = self.coordinator.update_status(id, update).await {
            warn!(agent_id = %id, error = %e, "Failed to mark agent failed");
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.starts_with('.') && !name.contains(['/', '\\']) && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_scenario_names() {
        assert!(is_plain_name("billing"));
        assert!(is_plain_name("invoice-generator_v2"));
        assert!(!is_plain_name("../etc"));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name(".hidden"));
    }

    #[test]
    fn test_session_conflict_maps_to_409() {
        let err = SpawnError::SessionConflict(Vec::new());
        assert_eq!(err.failure_info().to_http_status(), 409);
    }

    #[test]
    fn test_validation_error_uses_first_message() {
        let mut result = ValidationResult::default();
        result.add_error("model", "no_model", "model is required");
        let info = SpawnError::Validation(result).failure_info();
        assert_eq!(info.to_http_status(), 400);
        assert_eq!(info.message, "model is required");
    }
}
