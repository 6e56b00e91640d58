// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Spawn Request Validation
//!
//! Structural checks on an incoming spawn request, before any policy or
//! store access. Errors are collected per field rather than short-circuited
//! so a client sees every problem at once.
//!
//! | Code | Field | Meaning |
//! |------|-------|---------|
//! | `no_prompts` | `prompts` | nothing left after trimming |
//! | `no_model` | `model` | blank model |
//! | `no_scenario` | `scenario` | blank scenario |
//! | `skip_permissions_blocked` | `skipPermissions` | flag set |
//!
//! Prompts beyond `max_prompts` are dropped with a warning, not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client-facing spawn request.
///
/// All prompts share `scope`. With a non-empty scope the first admitted
/// prompt takes the locks and every later prompt fails with
/// `scope_conflict`; batch several prompts only with an empty scope, and
/// send one request per scope otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpawnRequest {
    pub prompts: Vec<String>,
    pub model: String,
    /// Backend selector for the CLI (`anthropic`, `bedrock`, `vertex`).
    pub provider: Option<String>,
    pub scenario: String,
    pub scope: Vec<String>,
    pub phases: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub skip_permissions: bool,
    pub network_enabled: Option<bool>,
    pub timeout_secs: Option<i64>,
    pub max_turns: Option<i64>,
    pub max_files: Option<i64>,
    pub max_bytes: Option<i64>,
    pub concurrency: Option<u32>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, code, message));
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// The first error recorded, in check order.
    pub fn first_error(&self) -> Option<&FieldError> {
        self.errors.first()
    }

    pub fn grouped(&self) -> BTreeMap<String, Vec<FieldError>> {
        let mut groups: BTreeMap<String, Vec<FieldError>> = BTreeMap::new();
        for error in &self.errors {
            groups.entry(error.field.clone()).or_default().push(error.clone());
        }
        groups
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Output of field validation: the normalized request and the findings.
#[derive(Debug, Clone)]
pub struct FieldValidation {
    pub request: SpawnRequest,
    pub result: ValidationResult,
}

/// Trim, drop and cap; then check required fields.
///
/// `max_prompts == 0` disables capping.
pub fn validate_fields(request: &SpawnRequest, max_prompts: usize) -> FieldValidation {
    let mut result = ValidationResult::default();
    let mut normalized = request.clone();

    normalized.prompts = request
        .prompts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if normalized.prompts.is_empty() {
        result.add_error("prompts", "no_prompts", "at least one non-empty prompt is required");
    } else if max_prompts > 0 && normalized.prompts.len() > max_prompts {
        result.add_warning(format!(
            "{} prompts submitted; only the first {max_prompts} will be spawned",
            normalized.prompts.len()
        ));
        normalized.prompts.truncate(max_prompts);
    }

    normalized.model = request.model.trim().to_string();
    if normalized.model.is_empty() {
        result.add_error("model", "no_model", "model is required");
    }

    normalized.scenario = request.scenario.trim().to_string();
    if normalized.scenario.is_empty() {
        result.add_error("scenario", "no_scenario", "scenario is required");
    }

    if request.skip_permissions {
        result.add_error(
            "skipPermissions",
            "skip_permissions_blocked",
            "skipping permission checks is not allowed",
        );
    }

    normalized.scope = trimmed(&request.scope);
    normalized.phases = trimmed(&request.phases);
    normalized.allowed_tools = trimmed(&request.allowed_tools);
    normalized.idempotency_key = request
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    FieldValidation {
        request: normalized,
        result,
    }
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SpawnRequest {
        SpawnRequest {
            prompts: vec!["  fix the flaky test ".to_string(), "   ".to_string()],
            model: "sonnet".to_string(),
            scenario: "billing".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_trims_and_drops_empty_prompts() {
        let validation = validate_fields(&request(), 10);
        assert!(validation.result.is_valid());
        assert_eq!(validation.request.prompts, vec!["fix the flaky test".to_string()]);
    }

    #[test]
    fn test_required_fields() {
        let validation = validate_fields(&SpawnRequest::default(), 10);
        let codes: Vec<_> = validation.result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["no_prompts", "no_model", "no_scenario"]);
        assert_eq!(validation.result.first_error().unwrap().code, "no_prompts");
        assert_eq!(validation.result.grouped().len(), 3);
    }

    #[test]
    fn test_prompts_are_capped_with_warning() {
        let mut req = request();
        req.prompts = (0..11).map(|i| format!("prompt {i}")).collect();
        let validation = validate_fields(&req, 10);
        assert!(validation.result.is_valid());
        assert_eq!(validation.request.prompts.len(), 10);
        assert_eq!(validation.result.warnings.len(), 1);
    }

    #[test]
    fn test_skip_permissions_blocked() {
        let mut req = request();
        req.skip_permissions = true;
        let validation = validate_fields(&req, 10);
        assert_eq!(validation.result.first_error().unwrap().code, "skip_permissions_blocked");
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: SpawnRequest = serde_json::from_value(serde_json::json!({
            "prompts": ["a"],
            "model": "m",
            "scenario": "s",
            "allowedTools": ["Read"],
            "timeoutSecs": 120,
            "idempotencyKey": "k1"
        }))
        .unwrap();
        assert_eq!(req.allowed_tools, vec!["Read".to_string()]);
        assert_eq!(req.timeout_secs, Some(120));
        assert_eq!(req.idempotency_key.as_deref(), Some("k1"));
    }
}
