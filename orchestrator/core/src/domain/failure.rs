// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Failure Taxonomy
//!
//! Converts any error into a [`FailureInfo`]: a closed category, a stable
//! machine-readable code, a user-safe message, retry guidance, an operator
//! recovery hint, and internal details that never leave the server.
//!
//! ## Classification order
//! | Input | Category / code |
//! |-------|-----------------|
//! | no error | `none` |
//! | cancellation | `transient` / `context_canceled` |
//! | deadline exceeded | `transient` / `database_timeout` (retry 2s) |
//! | missing row | `resource` / `agent_not_found` |
//! | connection loss | `transient` / `database_connection` (retry 1s) |
//! | scope conflict, duplicate, not running, lock acquisition | dedicated codes |
//! | anything else | `internal` / `unexpected_error` |
//!
//! Callers match on [`FailureCode`], never on error strings.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Error classification and HTTP/log projections

use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use crate::domain::error::CoordinatorError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    None,
    Transient,
    Validation,
    Conflict,
    Resource,
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::None => "none",
            FailureCategory::Transient => "transient",
            FailureCategory::Validation => "validation",
            FailureCategory::Conflict => "conflict",
            FailureCategory::Resource => "resource",
            FailureCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    None,
    ContextCanceled,
    DatabaseTimeout,
    DatabaseConnection,
    AgentNotFound,
    ScenarioNotFound,
    AgentAlreadyStopped,
    CapacityExceeded,
    ScopeConflict,
    DuplicateAgent,
    IdempotencyInFlight,
    LockAcquisitionFailed,
    ValidationFailed,
    ContainmentUnavailable,
    HeartbeatFailed,
    SessionTrackingFailed,
    ProcessStartFailed,
    ProcessTimeout,
    ProcessCanceled,
    ProcessExitFailed,
    UnexpectedError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::None => "none",
            FailureCode::ContextCanceled => "context_canceled",
            FailureCode::DatabaseTimeout => "database_timeout",
            FailureCode::DatabaseConnection => "database_connection",
            FailureCode::AgentNotFound => "agent_not_found",
            FailureCode::ScenarioNotFound => "scenario_not_found",
            FailureCode::AgentAlreadyStopped => "agent_already_stopped",
            FailureCode::CapacityExceeded => "capacity_exceeded",
            FailureCode::ScopeConflict => "scope_conflict",
            FailureCode::DuplicateAgent => "duplicate_agent",
            FailureCode::IdempotencyInFlight => "idempotency_in_flight",
            FailureCode::LockAcquisitionFailed => "lock_acquisition_failed",
            FailureCode::ValidationFailed => "validation_failed",
            FailureCode::ContainmentUnavailable => "containment_unavailable",
            FailureCode::HeartbeatFailed => "heartbeat_failed",
            FailureCode::SessionTrackingFailed => "session_tracking_failed",
            FailureCode::ProcessStartFailed => "process_start_failed",
            FailureCode::ProcessTimeout => "process_timeout",
            FailureCode::ProcessCanceled => "process_canceled",
            FailureCode::ProcessExitFailed => "process_exit_failed",
            FailureCode::UnexpectedError => "unexpected_error",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure. `internal_details` is for operators only and is
/// skipped when serialised for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub category: FailureCategory,
    pub code: FailureCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u32>,
    pub recovery: String,
    #[serde(skip)]
    pub internal_details: String,
}

impl FailureInfo {
    pub fn new(category: FailureCategory, code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            retryable: false,
            retry_after_seconds: None,
            recovery: String::new(),
            internal_details: String::new(),
        }
    }

    pub fn none() -> Self {
        Self::new(FailureCategory::None, FailureCode::None, "")
    }

    pub fn retry_after(mut self, seconds: Option<u32>) -> Self {
        self.retryable = true;
        self.retry_after_seconds = seconds;
        self
    }

    pub fn recovery(mut self, hint: impl Into<String>) -> Self {
        self.recovery = hint.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.internal_details = details.into();
        self
    }

    pub fn is_none(&self) -> bool {
        self.category == FailureCategory::None
    }

    /// Failure for a subprocess that could not be started.
    pub fn process_start_failed(details: impl Into<String>) -> Self {
        Self::new(
            FailureCategory::Internal,
            FailureCode::ProcessStartFailed,
            "The agent process could not be started",
        )
        .recovery("Check that the agent CLI is installed and on PATH")
        .details(details)
    }

    pub fn process_timeout(timeout_seconds: u64) -> Self {
        Self::new(
            FailureCategory::Resource,
            FailureCode::ProcessTimeout,
            format!("The agent exceeded its {timeout_seconds}s time limit"),
        )
        .recovery("Increase timeoutSecs or split the prompt into smaller tasks")
        .details(format!("deadline of {timeout_seconds}s elapsed"))
    }

    pub fn process_canceled(details: impl Into<String>) -> Self {
        Self::new(FailureCategory::Transient, FailureCode::ProcessCanceled, "The agent run was canceled")
            .details(details)
    }

    pub fn process_exit_failed(exit_code: Option<i32>, details: impl Into<String>) -> Self {
        let message = match exit_code {
            Some(code) => format!("The agent process exited with code {code}"),
            None => "The agent process was terminated by a signal".to_string(),
        };
        Self::new(FailureCategory::Internal, FailureCode::ProcessExitFailed, message)
            .recovery("Inspect the agent output and error fields")
            .details(details)
    }

    pub fn containment_unavailable(details: impl Into<String>) -> Self {
        Self::new(
            FailureCategory::Resource,
            FailureCode::ContainmentUnavailable,
            "OS-level sandbox is unavailable",
        )
        .recovery("Install or start the sandbox provider")
        .details(details)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Validation, FailureCode::ValidationFailed, message)
            .recovery("Fix the request fields and resubmit")
    }

    /// HTTP status for API responses.
    pub fn to_http_status(&self) -> u16 {
        match self.category {
            FailureCategory::None => 200,
            FailureCategory::Validation => 400,
            FailureCategory::Conflict => 409,
            FailureCategory::Transient => 503,
            FailureCategory::Internal => 500,
            FailureCategory::Resource => match self.code {
                FailureCode::AgentNotFound | FailureCode::ScenarioNotFound => 404,
                FailureCode::AgentAlreadyStopped => 400,
                _ => 503,
            },
        }
    }

    /// User-facing projection. Never contains `internal_details`.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("category".into(), self.category.as_str().into());
        map.insert("code".into(), self.code.as_str().into());
        map.insert("message".into(), self.message.clone().into());
        map.insert("retryable".into(), self.retryable.into());
        if let Some(seconds) = self.retry_after_seconds {
            map.insert("retryAfterSeconds".into(), seconds.into());
        }
        if !self.recovery.is_empty() {
            map.insert("recovery".into(), self.recovery.clone().into());
        }
        map
    }

    /// Operator-facing projection, including internal details.
    pub fn to_log_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("failure_category", self.category.as_str().to_string());
        fields.insert("failure_code", self.code.as_str().to_string());
        fields.insert("failure_message", self.message.clone());
        fields.insert("retryable", self.retryable.to_string());
        if let Some(seconds) = self.retry_after_seconds {
            fields.insert("retry_after_seconds", seconds.to_string());
        }
        if !self.recovery.is_empty() {
            fields.insert("recovery", self.recovery.clone());
        }
        fields.insert("internal_details", self.internal_details.clone());
        fields
    }

    /// Emit the operator view through `tracing`.
    pub fn log(&self, context: &str) {
        match self.category {
            FailureCategory::None => {}
            FailureCategory::Internal => tracing::error!(
                context,
                category = %self.category,
                code = %self.code,
                retryable = self.retryable,
                internal = %self.internal_details,
                "{}",
                self.message
            ),
            _ => tracing::warn!(
                context,
                category = %self.category,
                code = %self.code,
                retryable = self.retryable,
                internal = %self.internal_details,
                "{}",
                self.message
            ),
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.category, self.code, self.message)
    }
}

fn cancelled(details: String) -> FailureInfo {
    FailureInfo::new(FailureCategory::Transient, FailureCode::ContextCanceled, "The request was canceled")
        .retry_after(None)
        .recovery("Retry the request")
        .details(details)
}

fn database_timeout(details: String) -> FailureInfo {
    FailureInfo::new(
        FailureCategory::Transient,
        FailureCode::DatabaseTimeout,
        "The coordination store did not respond in time",
    )
    .retry_after(Some(2))
    .recovery("Check database load and connection pool sizing")
    .details(details)
}

fn database_connection(details: String) -> FailureInfo {
    FailureInfo::new(
        FailureCategory::Transient,
        FailureCode::DatabaseConnection,
        "The coordination store is temporarily unreachable",
    )
    .retry_after(Some(1))
    .recovery("Check database availability and network connectivity")
    .details(details)
}

fn agent_not_found(details: String) -> FailureInfo {
    FailureInfo::new(FailureCategory::Resource, FailureCode::AgentNotFound, "Agent not found")
        .recovery("Verify the agent ID; finished agents are removed after the retention window")
        .details(details)
}

fn scope_conflict(details: String) -> FailureInfo {
    FailureInfo::new(
        FailureCategory::Conflict,
        FailureCode::ScopeConflict,
        format!("Another agent is working on an overlapping scope ({details})"),
    )
    .recovery("Wait for the conflicting agent to finish, stop it, or narrow the scope")
    .details(details)
}

fn duplicate_agent(details: String) -> FailureInfo {
    FailureInfo::new(FailureCategory::Conflict, FailureCode::DuplicateAgent, details.clone())
        .recovery("An identical prompt is already running in this scenario")
        .details(details)
}

fn already_stopped(details: String) -> FailureInfo {
    FailureInfo::new(
        FailureCategory::Resource,
        FailureCode::AgentAlreadyStopped,
        "The agent is not running",
    )
    .recovery("No action needed; the agent already finished")
    .details(details)
}

fn lock_acquisition(details: String) -> FailureInfo {
    FailureInfo::new(
        FailureCategory::Transient,
        FailureCode::LockAcquisitionFailed,
        "Could not acquire scope locks; another agent claimed an overlapping path",
    )
    .retry_after(Some(2))
    .recovery("Retry shortly or narrow the scope")
    .details(details)
}

fn classify_repository(err: &RepositoryError) -> FailureInfo {
    let details = err.to_string();
    match err {
        RepositoryError::NotFound(_) => agent_not_found(details),
        RepositoryError::Timeout(_) => database_timeout(details),
        RepositoryError::Connection(_) => database_connection(details),
        RepositoryError::LockConflict(_) => lock_acquisition(details),
        RepositoryError::Duplicate(_)
        | RepositoryError::Database(_)
        | RepositoryError::Serialization(_) => classify_message(details),
    }
}

fn classify_coordinator(err: &CoordinatorError) -> FailureInfo {
    let details = err.to_string();
    match err {
        CoordinatorError::Cancelled => cancelled(details),
        CoordinatorError::DeadlineExceeded(_) => database_timeout(details),
        CoordinatorError::AgentNotFound(_) => agent_not_found(details),
        CoordinatorError::ScenarioNotFound(scenario) => FailureInfo::new(
            FailureCategory::Resource,
            FailureCode::ScenarioNotFound,
            format!("Scenario '{scenario}' does not exist"),
        )
        .recovery("Create the scenario directory or fix the scenario name")
        .details(details),
        CoordinatorError::ScopeConflict(_) => scope_conflict(details),
        CoordinatorError::DuplicateAgent(_) => duplicate_agent(details),
        CoordinatorError::NotRunning { .. } => already_stopped(details),
        CoordinatorError::CapacityExceeded { .. } => FailureInfo::new(
            FailureCategory::Resource,
            FailureCode::CapacityExceeded,
            "Too many agents are running; try again when some finish",
        )
        .retry_after(Some(30))
        .recovery("Raise TEST_GENIE_MAX_CONCURRENT_AGENTS or stop idle agents")
        .details(details),
        CoordinatorError::LockAcquisition(_) => lock_acquisition(details),
        CoordinatorError::IdempotencyInFlight(_) => FailureInfo::new(
            FailureCategory::Conflict,
            FailureCode::IdempotencyInFlight,
            "A request with this idempotency key is already in progress",
        )
        .recovery("Wait for the first request to finish before retrying")
        .details(details),
        CoordinatorError::Validation(message) => FailureInfo::validation(message.clone()).details(details),
        CoordinatorError::ProcessStart(_) => FailureInfo::process_start_failed(details),
        CoordinatorError::Repository(inner) => classify_repository(inner),
    }
}

/// Phrase dispatch for errors that reach us only as text.
fn classify_message(details: String) -> FailureInfo {
    let lower = details.to_ascii_lowercase();
    if lower.contains("scope conflict") {
        scope_conflict(details)
    } else if lower.contains("duplicate agent") {
        duplicate_agent(details)
    } else if lower.contains("not running") {
        already_stopped(details)
    } else if lower.contains("acquire lock") || lower.contains("lock acquisition") {
        lock_acquisition(details)
    } else if lower.contains("no rows") || lower.contains("row not found") {
        agent_not_found(details)
    } else if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("transaction has already been committed or rolled back")
    {
        database_connection(details)
    } else {
        FailureInfo::new(
            FailureCategory::Internal,
            FailureCode::UnexpectedError,
            "An unexpected error occurred",
        )
        .recovery("Check the server logs for details")
        .details(details)
    }
}

/// Classify any error (or its absence) into a [`FailureInfo`].
///
/// Pure: the same error always yields the same category and code.
pub fn classify_error(err: Option<&(dyn StdError + 'static)>) -> FailureInfo {
    let Some(err) = err else {
        return FailureInfo::none();
    };

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(coordinator) = e.downcast_ref::<CoordinatorError>() {
            return classify_coordinator(coordinator);
        }
        if let Some(repository) = e.downcast_ref::<RepositoryError>() {
            return classify_repository(repository);
        }
        if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return database_timeout(err.to_string());
        }
        if let Some(sqlx_err) = e.downcast_ref::<sqlx::Error>() {
            return classify_repository(&RepositoryError::from_sqlx_ref(sqlx_err));
        }
        current = e.source();
    }

    classify_message(err.to_string())
}

impl RepositoryError {
    fn from_sqlx_ref(err: &sqlx::Error) -> Self {
        let text = err.to_string();
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(text),
            sqlx::Error::PoolTimedOut => RepositoryError::Timeout(text),
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                RepositoryError::Connection(text)
            }
            _ => RepositoryError::Database(text),
        }
    }
}

impl CoordinatorError {
    pub fn failure_info(&self) -> FailureInfo {
        let err: &(dyn StdError + 'static) = self;
        classify_error(Some(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentStatus};

    fn classify(err: &(dyn StdError + 'static)) -> FailureInfo {
        classify_error(Some(err))
    }

    #[test]
    fn test_nil_is_none() {
        let info = classify_error(None);
        assert_eq!(info.category, FailureCategory::None);
        assert_eq!(info.to_http_status(), 200);
    }

    #[test]
    fn test_cancellation_and_deadline() {
        let info = classify(&CoordinatorError::Cancelled);
        assert_eq!(info.code, FailureCode::ContextCanceled);
        assert!(info.retryable);

        let info = classify(&CoordinatorError::DeadlineExceeded(std::time::Duration::from_secs(3)));
        assert_eq!(info.code, FailureCode::DatabaseTimeout);
        assert_eq!(info.retry_after_seconds, Some(2));
    }

    #[test]
    fn test_repository_errors() {
        let info = classify(&RepositoryError::NotFound("agents".into()));
        assert_eq!(info.code, FailureCode::AgentNotFound);
        assert!(!info.retryable);
        assert_eq!(info.to_http_status(), 404);

        let info = classify(&RepositoryError::Connection("pool closed".into()));
        assert_eq!(info.code, FailureCode::DatabaseConnection);
        assert_eq!(info.retry_after_seconds, Some(1));
        assert_eq!(info.to_http_status(), 503);

        let info = classify(&CoordinatorError::Repository(RepositoryError::LockConflict("api".into())));
        assert_eq!(info.code, FailureCode::LockAcquisitionFailed);
        assert_eq!(info.category, FailureCategory::Transient);
        assert!(info.retryable);
    }

    #[test]
    fn test_sqlx_errors_in_source_chain() {
        let info = classify(&sqlx::Error::RowNotFound);
        assert_eq!(info.code, FailureCode::AgentNotFound);
        let info = classify(&sqlx::Error::PoolTimedOut);
        assert_eq!(info.code, FailureCode::DatabaseTimeout);
        let info = classify(&sqlx::Error::PoolClosed);
        assert_eq!(info.code, FailureCode::DatabaseConnection);
    }

    #[test]
    fn test_conflicts_and_duplicates() {
        let info = classify(&CoordinatorError::DuplicateAgent(AgentId::new("b1")));
        assert_eq!(info.code, FailureCode::DuplicateAgent);
        assert_eq!(info.to_http_status(), 409);
        assert!(info.message.contains("duplicate agent: identical prompt already running (agent b1)"));

        let info = classify(&CoordinatorError::ScopeConflict(vec![]));
        assert_eq!(info.code, FailureCode::ScopeConflict);
        assert_eq!(info.category, FailureCategory::Conflict);
        assert!(!info.retryable);
    }

    #[test]
    fn test_not_running_maps_to_400() {
        let info = classify(&CoordinatorError::NotRunning {
            id: AgentId::new("a"),
            status: AgentStatus::Stopped,
        });
        assert_eq!(info.code, FailureCode::AgentAlreadyStopped);
        assert_eq!(info.to_http_status(), 400);
    }

    #[test]
    fn test_phrase_fallback_and_unexpected() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "scope conflict on api");
        assert_eq!(classify(&err).code, FailureCode::ScopeConflict);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "failed to acquire lock");
        assert_eq!(classify(&err).code, FailureCode::LockAcquisitionFailed);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let info = classify(&err);
        assert_eq!(info.code, FailureCode::UnexpectedError);
        assert_eq!(info.to_http_status(), 500);
    }

    #[test]
    fn test_classification_is_stable() {
        let err = CoordinatorError::CapacityExceeded { active: 5, max: 5 };
        assert_eq!(classify(&err).category, classify(&err).category);
        assert_eq!(classify(&err).to_http_status(), 503);
    }

    #[test]
    fn test_map_hides_internal_details_but_log_fields_keep_them() {
        let info = FailureInfo::process_start_failed("exec: claude: not found");
        let map = info.to_map();
        assert!(!map.contains_key("internalDetails"));
        assert!(!serde_json::to_string(&map).unwrap().contains("exec: claude"));
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("internalDetails").is_none());
        assert_eq!(info.to_log_fields()["internal_details"], "exec: claude: not found");
    }

    #[test]
    fn test_validation_and_scenario_status() {
        assert_eq!(FailureInfo::validation("bad").to_http_status(), 400);
        let info = classify(&CoordinatorError::ScenarioNotFound("nope".into()));
        assert_eq!(info.to_http_status(), 404);
    }
}
