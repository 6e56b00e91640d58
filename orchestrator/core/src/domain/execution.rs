// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution configuration
//!
//! The single description of an agent subprocess: command line, working
//! directory, environment, resource limits and agent metadata. Per-agent
//! limits are resolved by the `decide_*` functions, each of which reports
//! where its value came from and whether it was clamped.

use crate::domain::agent::AgentId;
use crate::domain::config::{Bounds, CoordinatorConfig, MAX_BYTES, MAX_FILES, MAX_TURNS, TIMEOUT_SECONDS};
use crate::domain::provider::ExecutionParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_AGENT_ID: &str = "TEST_GENIE_AGENT_ID";
pub const ENV_API_ENDPOINT: &str = "TEST_GENIE_API_ENDPOINT";
pub const ENV_SCENARIO: &str = "TEST_GENIE_SCENARIO";
pub const ENV_MAX_FILES: &str = "TEST_GENIE_MAX_FILES";
pub const ENV_MAX_BYTES: &str = "TEST_GENIE_MAX_BYTES";
pub const ENV_NETWORK_ENABLED: &str = "TEST_GENIE_NETWORK_ENABLED";

/// Prompts longer than this are shortened in display strings only.
pub const DISPLAY_PROMPT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Request,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult<T> {
    pub value: T,
    pub source: DecisionSource,
    pub was_clamped: bool,
    /// The requested value before clamping.
    pub original: Option<T>,
}

fn decide_bounded(requested: Option<i64>, bounds: Bounds, default: u64) -> DecisionResult<u64> {
    match requested {
        Some(value) if value > 0 => {
            let value = value as u64;
            let clamped = bounds.clamp(value);
            DecisionResult {
                value: clamped,
                source: DecisionSource::Request,
                was_clamped: clamped != value,
                original: Some(value),
            }
        }
        _ => DecisionResult {
            value: default,
            source: DecisionSource::Default,
            was_clamped: false,
            original: None,
        },
    }
}

fn narrow(decision: DecisionResult<u64>) -> DecisionResult<u32> {
    DecisionResult {
        value: decision.value as u32,
        source: decision.source,
        was_clamped: decision.was_clamped,
        original: decision.original.map(|v| v.min(u64::from(u32::MAX)) as u32),
    }
}

pub fn decide_timeout(requested: Option<i64>, config: &CoordinatorConfig) -> DecisionResult<u64> {
    decide_bounded(requested, TIMEOUT_SECONDS, config.default_timeout_seconds)
}

pub fn decide_max_turns(requested: Option<i64>, config: &CoordinatorConfig) -> DecisionResult<u32> {
    narrow(decide_bounded(requested, MAX_TURNS, u64::from(config.default_max_turns)))
}

pub fn decide_max_files(requested: Option<i64>, config: &CoordinatorConfig) -> DecisionResult<u32> {
    narrow(decide_bounded(requested, MAX_FILES, u64::from(config.default_max_files)))
}

pub fn decide_max_bytes(requested: Option<i64>, config: &CoordinatorConfig) -> DecisionResult<u64> {
    decide_bounded(requested, MAX_BYTES, config.default_max_bytes)
}

pub fn decide_network_enabled(requested: Option<bool>, config: &CoordinatorConfig) -> DecisionResult<bool> {
    match requested {
        Some(value) => DecisionResult {
            value,
            source: DecisionSource::Request,
            was_clamped: false,
            original: Some(value),
        },
        None => DecisionResult {
            value: config.default_network_enabled,
            source: DecisionSource::Default,
            was_clamped: false,
            original: None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub timeout_seconds: u64,
    pub max_turns: u32,
    pub max_files: u32,
    pub max_bytes: u64,
    pub network_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    pub agent_id: AgentId,
    pub scenario: String,
    pub scope: Vec<String>,
    pub phases: Vec<String>,
    pub model: String,
    pub prompt_index: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub limits: ResourceLimits,
    pub metadata: AgentMetadata,
    pub prompt: String,
    pub allowed_tools: Vec<String>,
    pub provider: Option<String>,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.limits.timeout_seconds)
    }

    /// Command line for logs. Long prompts are shortened; the real argument
    /// is never touched.
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.command.clone());
        for arg in &self.args {
            if *arg == self.prompt {
                parts.push(format!("{:?}", truncate_for_display(arg, DISPLAY_PROMPT_LIMIT)));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// Parameters handed to an execution provider.
    pub fn to_params(&self) -> ExecutionParams {
        ExecutionParams {
            prompt: self.prompt.clone(),
            model: self.metadata.model.clone(),
            provider: self.provider.clone(),
            allowed_tools: self.allowed_tools.clone(),
            max_turns: self.limits.max_turns,
            timeout_seconds: self.limits.timeout_seconds,
            working_dir: Some(self.working_dir.clone()),
            env: self.env.clone(),
        }
    }
}

/// Shorten `s` to at most `max` characters plus `...`.
pub fn truncate_for_display(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_clamps() {
        let config = CoordinatorConfig::default();
        let high = decide_timeout(Some(7200), &config);
        assert_eq!(high.value, 3600);
        assert!(high.was_clamped);
        assert_eq!(high.original, Some(7200));

        let low = decide_timeout(Some(10), &config);
        assert_eq!(low.value, 60);
        assert!(low.was_clamped);

        let ok = decide_timeout(Some(600), &config);
        assert_eq!(ok.value, 600);
        assert!(!ok.was_clamped);
        assert_eq!(ok.source, DecisionSource::Request);
    }

    #[test]
    fn test_non_positive_uses_default() {
        let config = CoordinatorConfig::default();
        for requested in [None, Some(0), Some(-5)] {
            let decision = decide_max_turns(requested, &config);
            assert_eq!(decision.value, config.default_max_turns);
            assert_eq!(decision.source, DecisionSource::Default);
        }
    }

    #[test]
    fn test_file_and_byte_bounds() {
        let config = CoordinatorConfig::default();
        assert_eq!(decide_max_files(Some(10_000), &config).value, 500);
        assert_eq!(decide_max_bytes(Some(12), &config).value, 1024);
        assert_eq!(decide_max_bytes(Some(i64::MAX), &config).value, 104_857_600);
    }

    #[test]
    fn test_network_decision() {
        let config = CoordinatorConfig::default();
        assert!(!decide_network_enabled(None, &config).value);
        let explicit = decide_network_enabled(Some(true), &config);
        assert!(explicit.value);
        assert_eq!(explicit.source, DecisionSource::Request);
    }

    #[test]
    fn test_truncate_for_display() {
        let short = "fix it";
        assert_eq!(truncate_for_display(short, 100), "fix it");
        let long = "x".repeat(150);
        let shown = truncate_for_display(&long, 100);
        assert_eq!(shown.len(), 103);
        assert!(shown.ends_with("..."));
    }
}
