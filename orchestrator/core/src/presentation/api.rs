// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Thin axum layer over [`SpawnService`] and [`CoordinatorService`]. Every
//! error is classified into a `FailureInfo` and rendered with its HTTP
//! status; internal details never reach the response body.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::application::coordinator::CoordinatorService;
use crate::application::spawn::{SpawnError, SpawnOutcome, SpawnService};
use crate::domain::agent::{AgentFilter, AgentId, AgentStatus};
use crate::domain::error::CoordinatorError;
use crate::domain::failure::FailureInfo;
use crate::domain::file_operation::{FileOperationKind, NewFileOperation};
use crate::domain::validation::{SpawnRequest, ValidationResult};

pub struct AppState {
    pub spawn: Arc<SpawnService>,
    pub coordinator: Arc<CoordinatorService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(spawn: Arc<SpawnService>) -> Self {
        Self {
            coordinator: Arc::clone(spawn.coordinator()),
            spawn,
            started_at: Instant::now(),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/agents", get(list_agents_handler))
        .route("/api/v1/agents/spawn", post(spawn_handler))
        .route("/api/v1/agents/stop-all", post(stop_all_handler))
        .route("/api/v1/agents/{id}", get(get_agent_handler).delete(delete_agent_handler))
        .route("/api/v1/agents/{id}/stop", post(stop_agent_handler))
        .route(
            "/api/v1/agents/{id}/file-operations",
            get(list_file_operations_handler).post(record_file_operation_handler),
        )
        .route("/api/v1/scope-locks", get(list_locks_handler))
        .route("/api/v1/scope-locks/check", post(check_locks_handler))
        .route(
            "/api/v1/spawn-sessions",
            get(list_sessions_handler).delete(clear_sessions_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Identify the caller: API key, then user id, then client IP.
pub fn principal_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(key) = header("x-api-key") {
        return Some(format!("key:{key}"));
    }
    if let Some(user) = header("x-user-id") {
        return Some(format!("user:{user}"));
    }
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("ip:{ip}"))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn from_failure(failure: &FailureInfo) -> Self {
        let status = StatusCode::from_u16(failure.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: json!({ "success": false, "error": failure.to_map() }),
        }
    }

    fn validation(result: &ValidationResult) -> Self {
        let failure = SpawnError::Validation(result.clone()).failure_info();
        let mut err = Self::from_failure(&failure);
        err.body["fieldErrors"] = json!(result.grouped());
        err
    }

    fn bad_request(message: &str) -> Self {
        Self::from_failure(&FailureInfo::validation(message))
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let failure = err.failure_info();
        failure.log("api");
        let mut api = Self::from_failure(&failure);
        if !err.conflicts().is_empty() {
            api.body["conflicts"] = json!(err.conflicts());
        }
        api
    }
}

impl From<SpawnError> for ApiError {
    fn from(err: SpawnError) -> Self {
        match err {
            SpawnError::Validation(result) => Self::validation(&result),
            SpawnError::Coordinator(inner) => Self::from(inner),
            SpawnError::SessionConflict(ref sessions) => {
                let failure = err.failure_info();
                let mut api = Self::from_failure(&failure);
                api.body["sessionConflicts"] = json!(sessions);
                api
            }
            other => {
                let failure = other.failure_info();
                failure.log("spawn");
                Self::from_failure(&failure)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "hostname": state.coordinator.hostname(),
        "runningAgents": state.coordinator.running_count(),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn spawn_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SpawnRequest>,
) -> ApiResult {
    let principal = principal_from_headers(&headers);
    match state.spawn.spawn(principal.as_deref(), request).await? {
        SpawnOutcome::Spawned(response) => Ok(Json(json!(response))),
        SpawnOutcome::Cached(payload) => Ok(Json(payload)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListAgentsQuery {
    pub scenario: Option<String>,
    /// Comma separated statuses.
    pub status: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
}

impl ListAgentsQuery {
    fn to_filter(&self) -> Result<AgentFilter, ApiError> {
        let mut statuses = Vec::new();
        if let Some(raw) = &self.status {
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status = AgentStatus::from_str(part).map_err(|e| ApiError::bad_request(&e.to_string()))?;
                statuses.push(status);
            }
        }
        Ok(AgentFilter {
            scenario: self.scenario.clone().filter(|s| !s.is_empty()),
            statuses,
            active_only: self.active.unwrap_or(false),
            older_than: None,
            limit: self.limit,
        })
    }
}

async fn list_agents_handler(State(state): State<Arc<AppState>>, Query(query): Query<ListAgentsQuery>) -> ApiResult {
    let filter = query.to_filter()?;
    let agents = state.coordinator.list_agents(&filter).await?;
    Ok(Json(json!({ "agents": agents, "count": agents.len() })))
}

async fn get_agent_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let agent = state.coordinator.get_agent(&AgentId::new(id)).await?;
    Ok(Json(json!(agent)))
}

async fn stop_agent_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let agent = state.coordinator.stop(&AgentId::new(id)).await?;
    Ok(Json(json!({ "success": true, "agent": agent })))
}

async fn stop_all_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    let report = state.coordinator.stop_all().await?;
    Ok(Json(json!({ "success": report.failed.is_empty(), "report": report })))
}

async fn delete_agent_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let id = AgentId::new(id);
    state.coordinator.delete_agent(&id).await?;
    Ok(Json(json!({ "success": true, "deleted": id })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocksQuery {
    pub scenario: Option<String>,
}

async fn list_locks_handler(State(state): State<Arc<AppState>>, Query(query): Query<LocksQuery>) -> ApiResult {
    let scenario = query.scenario.as_deref().filter(|s| !s.is_empty());
    let locks = state.coordinator.active_locks(scenario).await?;
    Ok(Json(json!({ "locks": locks, "count": locks.len() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLocksRequest {
    pub scenario: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

async fn check_locks_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckLocksRequest>,
) -> ApiResult {
    if request.scenario.trim().is_empty() {
        return Err(ApiError::bad_request("scenario is required"));
    }
    let conflicts = state
        .coordinator
        .preview_conflicts(&request.scenario, &request.scope)
        .await?;
    Ok(Json(json!({ "hasConflicts": !conflicts.is_empty(), "conflicts": conflicts })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationBody {
    pub operation: FileOperationKind,
    pub path: String,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub content_before: Option<String>,
    #[serde(default)]
    pub content_after: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
}

async fn record_file_operation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FileOperationBody>,
) -> ApiResult {
    if body.path.trim().is_empty() {
        return Err(ApiError::bad_request("path is required"));
    }
    let op = NewFileOperation {
        agent_id: AgentId::new(id),
        scenario: body.scenario.unwrap_or_default(),
        operation: body.operation,
        path: body.path,
        content_before: body.content_before,
        content_after: body.content_after,
        content_hash: body.content_hash,
    };
    let recorded = state.coordinator.record_file_operation(op).await?;
    Ok(Json(json!({ "success": true, "fileOperation": recorded })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

async fn list_file_operations_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    let id = AgentId::new(id);
    state.coordinator.get_agent(&id).await?;
    let ops = state.coordinator.file_operations_for_agent(&id, query.limit).await?;
    Ok(Json(json!({ "fileOperations": ops, "count": ops.len() })))
}

fn require_principal(headers: &HeaderMap) -> Result<String, ApiError> {
    principal_from_headers(headers)
        .ok_or_else(|| ApiError::bad_request("X-API-Key, X-User-Id or X-Forwarded-For header is required"))
}

async fn list_sessions_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    let principal = require_principal(&headers)?;
    let sessions = state.spawn.active_sessions(&principal).await?;
    Ok(Json(json!({ "sessions": sessions, "count": sessions.len() })))
}

async fn clear_sessions_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    let principal = require_principal(&headers)?;
    let cleared = state.spawn.clear_sessions(&principal).await?;
    Ok(Json(json!({ "success": true, "cleared": cleared })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_principal_precedence() {
        let mut headers = HeaderMap::new();
        assert!(principal_from_headers(&headers).is_none());

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(principal_from_headers(&headers).as_deref(), Some("ip:10.0.0.1"));

        headers.insert("x-user-id", HeaderValue::from_static("dana"));
        assert_eq!(principal_from_headers(&headers).as_deref(), Some("user:dana"));

        headers.insert("x-api-key", HeaderValue::from_static("k-123"));
        assert_eq!(principal_from_headers(&headers).as_deref(), Some("key:k-123"));
    }

    #[test]
    fn test_status_filter_parsing() {
        let query = ListAgentsQuery {
            status: Some("running, failed".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.statuses, vec![AgentStatus::Running, AgentStatus::Failed]);

        let bad = ListAgentsQuery {
            status: Some("paused".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.to_filter().unwrap_err().status, StatusCode::BAD_REQUEST);
    }
}
