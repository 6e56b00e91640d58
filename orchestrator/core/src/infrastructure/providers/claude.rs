// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Claude Code CLI Provider Adapter
//
// Anti-Corruption Layer for the `claude` command-line agent. Every
// CLI-specific flag and env switch lives here.

use crate::domain::provider::{ExecutionParams, ExecutionProvider, ProviderAvailability, ProviderError};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::process::Command;

pub const DEFAULT_BINARY: &str = "claude";

/// Backend used when a request names none.
pub const DEFAULT_BACKEND: &str = "anthropic";

pub struct ClaudeCodeProvider {
    binary: String,
}

impl ClaudeCodeProvider {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Use an explicit binary name or path instead of `claude` on PATH.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn resolve_binary(&self) -> Result<PathBuf, which::Error> {
        which::which(&self.binary)
    }
}

impl Default for ClaudeCodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn session_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)session[_ ]?id["']?\s*[:=]\s*["']?([A-Za-z0-9][A-Za-z0-9_-]{7,})"#)
            .unwrap_or_else(|_| unreachable!("static session pattern is valid"))
    })
}

#[async_trait]
impl ExecutionProvider for ClaudeCodeProvider {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn is_available(&self) -> ProviderAvailability {
        match self.resolve_binary() {
            Ok(path) => ProviderAvailability::available(path),
            Err(e) => ProviderAvailability::unavailable(format!("'{}' not found on PATH: {e}", self.binary)),
        }
    }

    fn build_command(&self, params: &ExecutionParams) -> Result<Command, ProviderError> {
        if params.prompt.trim().is_empty() {
            return Err(ProviderError::InvalidParams("prompt is required".to_string()));
        }
        if params.model.trim().is_empty() {
            return Err(ProviderError::InvalidParams("model is required".to_string()));
        }

        let binary = self
            .resolve_binary()
            .unwrap_or_else(|_| PathBuf::from(&self.binary));
        let mut cmd = Command::new(binary);
        cmd.arg("-p")
            .arg(&params.prompt)
            .arg("--model")
            .arg(&params.model)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");
        if params.max_turns > 0 {
            cmd.arg("--max-turns").arg(params.max_turns.to_string());
        }
        if !params.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(params.allowed_tools.join(","));
        }

        let backend = params
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_BACKEND);
        match backend.to_ascii_lowercase().as_str() {
            "bedrock" => {
                cmd.env("CLAUDE_CODE_USE_BEDROCK", "1");
            }
            "vertex" => {
                cmd.env("CLAUDE_CODE_USE_VERTEX", "1");
            }
            "anthropic" => {}
            other => {
                return Err(ProviderError::InvalidParams(format!("unsupported backend: {other}")));
            }
        }

        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&params.env);
        Ok(cmd)
    }

    fn extract_session_id(&self, output: &str) -> Option<String> {
        for line in output.lines() {
            let line = line.trim();
            if !line.starts_with('{') {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                if let Some(id) = value.get("session_id").and_then(|v| v.as_str()) {
                    if !id.is_empty() {
                        return Some(id.to_string());
                    }
                }
            }
        }
        session_pattern()
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ExecutionParams {
        ExecutionParams {
            prompt: "fix the tests".to_string(),
            model: "sonnet".to_string(),
            allowed_tools: vec!["Read".to_string(), "Edit".to_string()],
            max_turns: 30,
            ..Default::default()
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_build_command_flags() {
        let cmd = ClaudeCodeProvider::new().build_command(&params()).unwrap();
        let args = args(&cmd);
        assert_eq!(&args[..2], &["-p".to_string(), "fix the tests".to_string()]);
        assert!(args.windows(2).any(|w| w == ["--model", "sonnet"]));
        assert!(args.windows(2).any(|w| w == ["--max-turns", "30"]));
        assert!(args.windows(2).any(|w| w == ["--allowedTools", "Read,Edit"]));
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
        assert!(args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn test_requires_prompt_and_model() {
        let provider = ClaudeCodeProvider::new();
        let mut p = params();
        p.prompt = "  ".to_string();
        assert!(provider.build_command(&p).is_err());
        let mut p = params();
        p.model.clear();
        assert!(provider.build_command(&p).is_err());
    }

    #[test]
    fn test_backend_env_switches() {
        let provider = ClaudeCodeProvider::new();
        let mut p = params();
        p.provider = Some("bedrock".to_string());
        let cmd = provider.build_command(&p).unwrap();
        let envs: Vec<_> = cmd.as_std().get_envs().collect();
        assert!(envs
            .iter()
            .any(|(k, v)| *k == "CLAUDE_CODE_USE_BEDROCK" && v.map(|v| v == "1").unwrap_or(false)));

        p.provider = Some("mystery".to_string());
        assert!(provider.build_command(&p).is_err());
    }

    #[test]
    fn test_extract_session_id() {
        let provider = ClaudeCodeProvider::new();
        let output = "noise\n{\"type\":\"system\",\"session_id\":\"3f2a9c1e-77aa\"}\n";
        assert_eq!(provider.extract_session_id(output).as_deref(), Some("3f2a9c1e-77aa"));
        assert_eq!(
            provider.extract_session_id("Session ID: abc12345def").as_deref(),
            Some("abc12345def")
        );
        assert!(provider.extract_session_id("nothing here").is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let provider = ClaudeCodeProvider::with_binary("definitely-not-a-real-binary-xyz");
        let availability = provider.is_available().await;
        assert!(!availability.available);
        assert!(availability.reason.is_some());
    }
}
