// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Security validation of spawn requests.
//!
//! Four policy checks, all of which always run so operators see every
//! issue: the skip-permissions ban, tool sanitization, scope sandboxing and
//! a safety scan of every prompt. Tool and prompt policy is delegated to a
//! [`SafetyValidator`].

use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::validation::ValidationResult;
use std::path::Path;
use std::sync::Arc;

/// Tools granted when a request names none.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &["Read", "Write", "Edit", "Glob", "Grep", "LS"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyViolation {
    #[error("tool '{tool}' rejected: {reason}")]
    Tool { tool: String, reason: String },

    #[error("prompt rejected: {reason}")]
    Prompt { reason: String },
}

/// Black-box policy for tools and prompt text.
pub trait SafetyValidator: Send + Sync {
    /// Sanitize a tool list. Empty input yields the defaults.
    fn sanitize_tools(&self, tools: &[String]) -> Result<Vec<String>, Vec<SafetyViolation>>;

    fn check_prompt(&self, prompt: &str) -> Result<(), SafetyViolation>;
}

/// Fields the security pass inspects.
#[derive(Debug, Clone, Copy)]
pub struct SecurityInput<'a> {
    pub skip_permissions: bool,
    pub allowed_tools: &'a [String],
    pub scope: &'a [String],
    pub prompts: &'a [String],
    pub scenario_root: &'a Path,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityValidation {
    pub sanitized_tools: Vec<String>,
    pub result: ValidationResult,
}

pub struct SecurityValidator {
    safety: Arc<dyn SafetyValidator>,
    sanitizer: PathSanitizer,
}

impl SecurityValidator {
    pub fn new(safety: Arc<dyn SafetyValidator>) -> Self {
        Self {
            safety,
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn validate(&self, input: SecurityInput<'_>) -> SecurityValidation {
        let mut validation = SecurityValidation::default();
        let result = &mut validation.result;

        if input.skip_permissions {
            result.add_error(
                "skipPermissions",
                "skip_permissions_blocked",
                "skipping permission checks is never allowed",
            );
        }

        match self.safety.sanitize_tools(input.allowed_tools) {
            Ok(tools) => validation.sanitized_tools = tools,
            Err(violations) => {
                for violation in violations {
                    result.add_error("allowedTools", "invalid_tool", violation.to_string());
                }
            }
        }

        for path in input.scope {
            if let Err(e) = self.sanitizer.resolve_in_scenario(path, input.scenario_root) {
                result.add_error("scope", "unsafe_scope_path", e.to_string());
            }
        }

        for (index, prompt) in input.prompts.iter().enumerate() {
            if let Err(violation) = self.safety.check_prompt(prompt) {
                result.add_error("prompts", "unsafe_prompt", format!("prompt {index}: {violation}"));
            }
        }

        if !validation.result.is_valid() {
            tracing::warn!(
                errors = validation.result.errors.len(),
                "Spawn request rejected by security validation"
            );
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectEverything;

    impl SafetyValidator for RejectEverything {
        fn sanitize_tools(&self, tools: &[String]) -> Result<Vec<String>, Vec<SafetyViolation>> {
            Err(tools
                .iter()
                .map(|t| SafetyViolation::Tool {
                    tool: t.clone(),
                    reason: "nope".into(),
                })
                .collect())
        }

        fn check_prompt(&self, _prompt: &str) -> Result<(), SafetyViolation> {
            Err(SafetyViolation::Prompt { reason: "nope".into() })
        }
    }

    #[test]
    fn test_all_checks_run() {
        let validator = SecurityValidator::new(Arc::new(RejectEverything));
        let tools = vec!["Bash".to_string()];
        let scope = vec!["../escape".to_string(), "ok".to_string()];
        let prompts = vec!["a".to_string(), "b".to_string()];
        let validation = validator.validate(SecurityInput {
            skip_permissions: true,
            allowed_tools: &tools,
            scope: &scope,
            prompts: &prompts,
            scenario_root: Path::new("/repo/scenarios/s"),
        });
        let codes: Vec<_> = validation.result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["skip_permissions_blocked", "invalid_tool", "unsafe_scope_path", "unsafe_prompt", "unsafe_prompt"]
        );
        assert_eq!(validation.result.first_error().unwrap().field, "skipPermissions");
    }
}
