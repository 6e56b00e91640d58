// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Builder
//!
//! Turns an admitted agent plus its validated request into the single
//! `ExecutionConfig` the rest of the launch path consumes. Limits are
//! resolved with the `decide_*` functions; clamped values surface as
//! warnings instead of errors.

use std::collections::BTreeMap;

use crate::domain::agent::Agent;
use crate::domain::config::CoordinatorConfig;
use crate::domain::execution::{
    decide_max_bytes, decide_max_files, decide_max_turns, decide_network_enabled, decide_timeout, AgentMetadata,
    DecisionResult, ExecutionConfig, ResourceLimits, ENV_AGENT_ID, ENV_API_ENDPOINT, ENV_MAX_BYTES, ENV_MAX_FILES,
    ENV_NETWORK_ENABLED, ENV_SCENARIO,
};
use crate::domain::provider::ExecutionProvider;
use crate::domain::validation::SpawnRequest;

pub struct ExecutionBuilderInput<'a> {
    pub agent: &'a Agent,
    pub request: &'a SpawnRequest,
    /// Tools already sanitized by the security pass.
    pub allowed_tools: &'a [String],
    pub provider: &'a dyn ExecutionProvider,
    pub config: &'a CoordinatorConfig,
}

#[derive(Debug, Clone)]
pub struct ExecutionBuilderResult {
    pub config: Option<ExecutionConfig>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub success: bool,
}

impl ExecutionBuilderResult {
    fn failed(errors: Vec<String>) -> Self {
        Self {
            config: None,
            errors,
            warnings: Vec::new(),
            success: false,
        }
    }
}

pub struct ExecutionBuilder;

impl ExecutionBuilder {
    pub fn build(input: ExecutionBuilderInput<'_>) -> ExecutionBuilderResult {
        let ExecutionBuilderInput {
            agent,
            request,
            allowed_tools,
            provider,
            config,
        } = input;

        let mut errors = Vec::new();
        if agent.id.as_str().is_empty() {
            errors.push("agent id is required".to_string());
        }
        if agent.prompt.trim().is_empty() {
            errors.push("prompt is required".to_string());
        }
        if agent.model.trim().is_empty() {
            errors.push("model is required".to_string());
        }
        if agent.scenario.trim().is_empty() {
            errors.push("scenario is required".to_string());
        }
        if !errors.is_empty() {
            return ExecutionBuilderResult::failed(errors);
        }

        let mut warnings = Vec::new();
        let timeout = decide_timeout(request.timeout_secs, config);
        let max_turns = decide_max_turns(request.max_turns, config);
        let max_files = decide_max_files(request.max_files, config);
        let max_bytes = decide_max_bytes(request.max_bytes, config);
        let network = decide_network_enabled(request.network_enabled, config);
        note_clamp(&mut warnings, "timeoutSecs", &timeout);
        note_clamp(&mut warnings, "maxTurns", &max_turns);
        note_clamp(&mut warnings, "maxFiles", &max_files);
        note_clamp(&mut warnings, "maxBytes", &max_bytes);

        let limits = ResourceLimits {
            timeout_seconds: timeout.value,
            max_turns: max_turns.value,
            max_files: max_files.value,
            max_bytes: max_bytes.value,
            network_enabled: network.value,
        };

        let mut env = BTreeMap::new();
        env.insert(ENV_AGENT_ID.to_string(), agent.id.to_string());
        env.insert(ENV_API_ENDPOINT.to_string(), config.api_endpoint.clone());
        env.insert(ENV_SCENARIO.to_string(), agent.scenario.clone());
        env.insert(ENV_MAX_FILES.to_string(), limits.max_files.to_string());
        env.insert(ENV_MAX_BYTES.to_string(), limits.max_bytes.to_string());
        env.insert(ENV_NETWORK_ENABLED.to_string(), limits.network_enabled.to_string());

        let mut execution = ExecutionConfig {
            command: String::new(),
            args: Vec::new(),
            working_dir: config.scenario_root(&agent.scenario),
            env,
            limits,
            metadata: AgentMetadata {
                agent_id: agent.id.clone(),
                scenario: agent.scenario.clone(),
                scope: agent.scope.clone(),
                phases: agent.phases.clone(),
                model: agent.model.clone(),
                prompt_index: agent.prompt_index,
            },
            prompt: agent.prompt.clone(),
            allowed_tools: allowed_tools.to_vec(),
            provider: request.provider.clone(),
        };

        // Dry-build once so the config carries the real command line and
        // any backend switches the provider sets.
        match provider.build_command(&execution.to_params()) {
            Ok(cmd) => {
                let std_cmd = cmd.as_std();
                execution.command = std_cmd.get_program().to_string_lossy().into_owned();
                execution.args = std_cmd
                    .get_args()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect();
                for (key, value) in std_cmd.get_envs() {
                    if let Some(value) = value {
                        execution
                            .env
                            .entry(key.to_string_lossy().into_owned())
                            .or_insert_with(|| value.to_string_lossy().into_owned());
                    }
                }
            }
            Err(e) => return ExecutionBuilderResult::failed(vec![e.to_string()]),
        }

        tracing::debug!(
            agent_id = %agent.id,
            command = %execution.display_command(),
            "Execution config built"
        );

        ExecutionBuilderResult {
            config: Some(execution),
            errors: Vec::new(),
            warnings,
            success: true,
        }
    }
}

fn note_clamp<T: std::fmt::Display + Copy>(warnings: &mut Vec<String>, field: &str, decision: &DecisionResult<T>) {
    if decision.was_clamped {
        if let Some(original) = decision.original {
            warnings.push(format!("{field} {original} is out of range; using {}", decision.value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, CreateAgentInput};
    use crate::domain::provider::{ExecutionParams, ProviderAvailability, ProviderError};
    use async_trait::async_trait;
    use chrono::Utc;

    struct EchoProvider;

    #[async_trait]
    impl ExecutionProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn is_available(&self) -> ProviderAvailability {
            ProviderAvailability::available("/bin/echo".into())
        }

        fn build_command(&self, params: &ExecutionParams) -> Result<tokio::process::Command, ProviderError> {
            let mut cmd = tokio::process::Command::new("echo");
            cmd.arg(&params.prompt).env("ECHO_BACKEND", "local");
            Ok(cmd)
        }

        fn extract_session_id(&self, _output: &str) -> Option<String> {
            None
        }
    }

    fn agent(prompt: &str) -> Agent {
        let input = CreateAgentInput {
            scenario: "billing".to_string(),
            scope: vec!["api".to_string()],
            model: "sonnet".to_string(),
            prompt: prompt.to_string(),
            ..Default::default()
        };
        Agent::pending(&input, AgentId::new("abc123def456"), Utc::now())
    }

    #[test]
    fn test_builds_env_and_limits() {
        let config = CoordinatorConfig::default();
        let agent = agent("add tests");
        let request = SpawnRequest {
            timeout_secs: Some(99_999),
            ..Default::default()
        };
        let tools = vec!["Read".to_string()];
        let result = ExecutionBuilder::build(ExecutionBuilderInput {
            agent: &agent,
            request: &request,
            allowed_tools: &tools,
            provider: &EchoProvider,
            config: &config,
        });

        assert!(result.success);
        let built = result.config.unwrap();
        assert_eq!(built.limits.timeout_seconds, 3600);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(built.env[ENV_AGENT_ID], "abc123def456");
        assert_eq!(built.env[ENV_SCENARIO], "billing");
        assert_eq!(built.env[ENV_MAX_FILES], config.default_max_files.to_string());
        assert_eq!(built.env[ENV_NETWORK_ENABLED], "false");
        assert_eq!(built.env["ECHO_BACKEND"], "local");
        assert_eq!(built.command, "echo");
        assert_eq!(built.args, vec!["add tests".to_string()]);
        assert!(built.working_dir.ends_with("scenarios/billing"));
    }

    #[test]
    fn test_long_prompt_is_shortened_for_display_only() {
        let config = CoordinatorConfig::default();
        let prompt = "p".repeat(250);
        let agent = agent(&prompt);
        let request = SpawnRequest::default();
        let result = ExecutionBuilder::build(ExecutionBuilderInput {
            agent: &agent,
            request: &request,
            allowed_tools: &[],
            provider: &EchoProvider,
            config: &config,
        });
        let built = result.config.unwrap();
        assert_eq!(built.prompt.len(), 250);
        assert!(built.display_command().contains("..."));
        assert!(!built.display_command().contains(&prompt));
    }

    #[test]
    fn test_missing_fields_fail() {
        let config = CoordinatorConfig::default();
        let mut agent = agent("x");
        agent.model = String::new();
        let request = SpawnRequest::default();
        let result = ExecutionBuilder::build(ExecutionBuilderInput {
            agent: &agent,
            request: &request,
            allowed_tools: &[],
            provider: &EchoProvider,
            config: &config,
        });
        assert!(!result.success);
        assert!(result.config.is_none());
        assert_eq!(result.errors, vec!["model is required".to_string()]);
    }
}
