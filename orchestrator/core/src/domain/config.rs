// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration
//
// Tunable levers in four groups:
// - Locking & coordination (lock timeout, heartbeat, store timeout)
// - Execution defaults (timeout, turns, file and byte caps, network)
// - Retention & cleanup
// - Spawn limits
//
// Every field has an env var, a documented range and a default. Loading
// clamps out-of-range values to the bound and falls back to the default for
// malformed values. The struct is immutable after load.

use crate::domain::host::EnvironmentProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "TEST_GENIE_";

/// Inclusive range plus default for one integer lever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u64,
    pub max: u64,
    pub default: u64,
}

impl Bounds {
    pub const fn new(min: u64, max: u64, default: u64) -> Self {
        Self { min, max, default }
    }

    pub fn clamp(&self, value: u64) -> u64 {
        value.clamp(self.min, self.max)
    }
}

pub const LOCK_TIMEOUT_MINUTES: Bounds = Bounds::new(5, 240, 15);
pub const HEARTBEAT_INTERVAL_MINUTES: Bounds = Bounds::new(1, 60, 3);
pub const MAX_HEARTBEAT_FAILURES: Bounds = Bounds::new(1, 20, 3);
pub const STORE_TIMEOUT_SECONDS: Bounds = Bounds::new(1, 120, 10);
pub const TIMEOUT_SECONDS: Bounds = Bounds::new(60, 3600, 900);
pub const MAX_TURNS: Bounds = Bounds::new(5, 200, 50);
pub const MAX_FILES: Bounds = Bounds::new(1, 500, 50);
pub const MAX_BYTES: Bounds = Bounds::new(1024, 104_857_600, 10_485_760);
pub const RETENTION_DAYS: Bounds = Bounds::new(1, 365, 7);
pub const CLEANUP_INTERVAL_MINUTES: Bounds = Bounds::new(1, 1440, 60);
pub const IDEMPOTENCY_TTL_MINUTES: Bounds = Bounds::new(1, 1440, 60);
pub const SPAWN_SESSION_TTL_MINUTES: Bounds = Bounds::new(1, 1440, 30);
pub const MAX_PROMPTS_PER_SPAWN: Bounds = Bounds::new(1, 100, 10);
pub const MAX_CONCURRENT_AGENTS: Bounds = Bounds::new(1, 200, 20);
pub const DEFAULT_CONCURRENCY: Bounds = Bounds::new(1, 50, 4);

const PERMISSIVE_MAX_FILES: u64 = 200;
const PERMISSIVE_MAX_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    // Locking & coordination
    pub lock_timeout_minutes: u64,
    pub heartbeat_interval_minutes: u64,
    pub max_heartbeat_failures: u32,
    pub store_timeout_seconds: u64,

    // Execution defaults
    pub default_timeout_seconds: u64,
    pub default_max_turns: u32,
    pub default_max_files: u32,
    pub default_max_bytes: u64,
    pub default_network_enabled: bool,

    // Retention & cleanup
    pub retention_days: u32,
    pub cleanup_interval_minutes: u64,
    pub idempotency_ttl_minutes: u64,
    pub spawn_session_ttl_minutes: u64,

    // Spawn limits
    pub max_prompts_per_spawn: u32,
    pub max_concurrent_agents: u32,
    pub default_concurrency: u32,

    // Paths and endpoints
    pub repo_root: PathBuf,
    pub scenarios_dir: String,
    pub api_endpoint: String,
    pub cli_binary: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_minutes: LOCK_TIMEOUT_MINUTES.default,
            heartbeat_interval_minutes: derived_heartbeat(LOCK_TIMEOUT_MINUTES.default),
            max_heartbeat_failures: MAX_HEARTBEAT_FAILURES.default as u32,
            store_timeout_seconds: STORE_TIMEOUT_SECONDS.default,
            default_timeout_seconds: TIMEOUT_SECONDS.default,
            default_max_turns: MAX_TURNS.default as u32,
            default_max_files: MAX_FILES.default as u32,
            default_max_bytes: MAX_BYTES.default,
            default_network_enabled: false,
            retention_days: RETENTION_DAYS.default as u32,
            cleanup_interval_minutes: CLEANUP_INTERVAL_MINUTES.default,
            idempotency_ttl_minutes: IDEMPOTENCY_TTL_MINUTES.default,
            spawn_session_ttl_minutes: SPAWN_SESSION_TTL_MINUTES.default,
            max_prompts_per_spawn: MAX_PROMPTS_PER_SPAWN.default as u32,
            max_concurrent_agents: MAX_CONCURRENT_AGENTS.default as u32,
            default_concurrency: DEFAULT_CONCURRENCY.default as u32,
            repo_root: PathBuf::from("."),
            scenarios_dir: "scenarios".to_string(),
            api_endpoint: "http://127.0.0.1:8000".to_string(),
            cli_binary: None,
        }
    }
}

fn derived_heartbeat(lock_timeout_minutes: u64) -> u64 {
    (lock_timeout_minutes / 4).max(1)
}

fn read_bounded(env: &dyn EnvironmentProvider, name: &str, bounds: Bounds) -> Option<u64> {
    let key = format!("{ENV_PREFIX}{name}");
    let raw = env.var(&key)?;
    match raw.trim().parse::<i64>() {
        Ok(value) => {
            let clamped = if value < 0 { bounds.min } else { bounds.clamp(value as u64) };
            if clamped as i64 != value {
                tracing::debug!(key = %key, value, clamped, "Configuration value clamped to range");
            }
            Some(clamped)
        }
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Invalid configuration value, using default");
            None
        }
    }
}

fn read_bool(env: &dyn EnvironmentProvider, name: &str) -> Option<bool> {
    let key = format!("{ENV_PREFIX}{name}");
    let raw = env.var(&key)?;
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key = %key, value = %raw, "Invalid boolean, expected true/false. Ignoring.");
            None
        }
    }
}

fn read_string(env: &dyn EnvironmentProvider, name: &str) -> Option<String> {
    env.var(&format!("{ENV_PREFIX}{name}"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CoordinatorConfig {
    /// Load from the environment with per-field clamping.
    pub fn from_env(env: &dyn EnvironmentProvider) -> Self {
        let mut config = Self::default();
        let int = |name: &str, bounds: Bounds| read_bounded(env, name, bounds).unwrap_or(bounds.default);

        config.lock_timeout_minutes = int("LOCK_TIMEOUT_MINUTES", LOCK_TIMEOUT_MINUTES);
        config.heartbeat_interval_minutes = read_bounded(env, "HEARTBEAT_INTERVAL_MINUTES", HEARTBEAT_INTERVAL_MINUTES)
            .unwrap_or_else(|| derived_heartbeat(config.lock_timeout_minutes));
        config.max_heartbeat_failures = int("MAX_HEARTBEAT_FAILURES", MAX_HEARTBEAT_FAILURES) as u32;
        config.store_timeout_seconds = int("STORE_TIMEOUT_SECONDS", STORE_TIMEOUT_SECONDS);

        config.default_timeout_seconds = int("DEFAULT_TIMEOUT_SECONDS", TIMEOUT_SECONDS);
        config.default_max_turns = int("DEFAULT_MAX_TURNS", MAX_TURNS) as u32;
        config.default_max_files = int("DEFAULT_MAX_FILES", MAX_FILES) as u32;
        config.default_max_bytes = int("DEFAULT_MAX_BYTES", MAX_BYTES);
        config.default_network_enabled = read_bool(env, "DEFAULT_NETWORK_ENABLED").unwrap_or(false);

        config.retention_days = int("RETENTION_DAYS", RETENTION_DAYS) as u32;
        config.cleanup_interval_minutes = int("CLEANUP_INTERVAL_MINUTES", CLEANUP_INTERVAL_MINUTES);
        config.idempotency_ttl_minutes = int("IDEMPOTENCY_TTL_MINUTES", IDEMPOTENCY_TTL_MINUTES);
        config.spawn_session_ttl_minutes = int("SPAWN_SESSION_TTL_MINUTES", SPAWN_SESSION_TTL_MINUTES);

        config.max_prompts_per_spawn = int("MAX_PROMPTS_PER_SPAWN", MAX_PROMPTS_PER_SPAWN) as u32;
        config.max_concurrent_agents = int("MAX_CONCURRENT_AGENTS", MAX_CONCURRENT_AGENTS) as u32;
        config.default_concurrency = int("DEFAULT_CONCURRENCY", DEFAULT_CONCURRENCY) as u32;

        if let Some(root) = read_string(env, "REPO_ROOT") {
            config.repo_root = PathBuf::from(root);
        } else if let Ok(cwd) = std::env::current_dir() {
            config.repo_root = cwd;
        }
        if let Some(dir) = read_string(env, "SCENARIOS_DIR") {
            config.scenarios_dir = dir;
        }
        if let Some(endpoint) = read_string(env, "API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }
        config.cli_binary = read_string(env, "CLI_BINARY");

        config
    }

    /// `from_env` followed by `validate`.
    pub fn load(env: &dyn EnvironmentProvider) -> Self {
        let mut config = Self::from_env(env);
        config.validate();
        config
    }

    /// Self-correct soft inconsistencies.
    ///
    /// The heartbeat must fire at least twice per lock lifetime, and the
    /// per-request concurrency can never exceed the global cap.
    pub fn validate(&mut self) {
        if self.heartbeat_interval_minutes * 2 >= self.lock_timeout_minutes {
            let corrected = derived_heartbeat(self.lock_timeout_minutes);
            tracing::warn!(
                heartbeat = self.heartbeat_interval_minutes,
                lock_timeout = self.lock_timeout_minutes,
                corrected,
                "Heartbeat interval too close to lock timeout, correcting"
            );
            self.heartbeat_interval_minutes = corrected;
        }
        if self.default_concurrency > self.max_concurrent_agents {
            tracing::warn!(
                default_concurrency = self.default_concurrency,
                max_concurrent_agents = self.max_concurrent_agents,
                "Default concurrency above max concurrent agents, correcting"
            );
            self.default_concurrency = self.max_concurrent_agents;
        }
    }

    /// Non-mutating review. Returns operator-facing warnings.
    pub fn validate_with_report(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.default_network_enabled {
            warnings.push("network access is enabled by default for every agent".to_string());
        }
        if u64::from(self.default_max_files) > PERMISSIVE_MAX_FILES {
            warnings.push(format!(
                "default max files ({}) is very permissive (> {PERMISSIVE_MAX_FILES})",
                self.default_max_files
            ));
        }
        if self.default_max_bytes > PERMISSIVE_MAX_BYTES {
            warnings.push(format!(
                "default max bytes ({}) is very permissive (> {PERMISSIVE_MAX_BYTES})",
                self.default_max_bytes
            ));
        }
        if self.heartbeat_interval_minutes * 2 >= self.lock_timeout_minutes {
            warnings.push(format!(
                "heartbeat interval ({}m) should be less than half the lock timeout ({}m)",
                self.heartbeat_interval_minutes, self.lock_timeout_minutes
            ));
        }
        if self.default_concurrency > self.max_concurrent_agents {
            warnings.push(format!(
                "default concurrency ({}) exceeds max concurrent agents ({})",
                self.default_concurrency, self.max_concurrent_agents
            ));
        }
        warnings
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_minutes * 60)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_minutes * 60)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.idempotency_ttl_minutes as i64)
    }

    pub fn spawn_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.spawn_session_ttl_minutes as i64)
    }

    pub fn scenarios_root(&self) -> PathBuf {
        self.repo_root.join(&self.scenarios_dir)
    }

    pub fn scenario_root(&self, scenario: &str) -> PathBuf {
        self.scenarios_root().join(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, String>);

    impl MapEnv {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self(pairs.iter().map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string())).collect())
        }
    }

    impl EnvironmentProvider for MapEnv {
        fn var(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }

        fn hostname(&self) -> String {
            "test-host".to_string()
        }
    }

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[]));
        assert_eq!(config.lock_timeout_minutes, 15);
        assert_eq!(config.heartbeat_interval_minutes, 3);
        assert_eq!(config.default_timeout_seconds, 900);
        assert_eq!(config.max_prompts_per_spawn, 10);
        assert!(!config.default_network_enabled);
        assert!(config.validate_with_report().is_empty());
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[
            ("LOCK_TIMEOUT_MINUTES", "1"),
            ("DEFAULT_TIMEOUT_SECONDS", "7200"),
            ("MAX_CONCURRENT_AGENTS", "-4"),
        ]));
        assert_eq!(config.lock_timeout_minutes, 5);
        assert_eq!(config.default_timeout_seconds, 3600);
        assert_eq!(config.max_concurrent_agents, 1);
    }

    #[test]
    fn test_malformed_values_use_default() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[
            ("LOCK_TIMEOUT_MINUTES", "soon"),
            ("DEFAULT_NETWORK_ENABLED", "maybe"),
        ]));
        assert_eq!(config.lock_timeout_minutes, 15);
        assert!(!config.default_network_enabled);
    }

    #[test]
    fn test_heartbeat_is_derived_from_lock_timeout() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[("LOCK_TIMEOUT_MINUTES", "60")]));
        assert_eq!(config.heartbeat_interval_minutes, 15);
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[("LOCK_TIMEOUT_MINUTES", "5")]));
        assert_eq!(config.heartbeat_interval_minutes, 1);
    }

    #[test]
    fn test_validate_self_corrects() {
        let mut config = CoordinatorConfig::from_env(&MapEnv::new(&[
            ("LOCK_TIMEOUT_MINUTES", "10"),
            ("HEARTBEAT_INTERVAL_MINUTES", "8"),
            ("MAX_CONCURRENT_AGENTS", "2"),
            ("DEFAULT_CONCURRENCY", "6"),
        ]));
        let before = config.clone();
        let warnings = config.validate_with_report();
        assert_eq!(config, before);
        assert_eq!(warnings.len(), 2);

        config.validate();
        assert_eq!(config.heartbeat_interval_minutes, 2);
        assert_eq!(config.default_concurrency, 2);
    }

    #[test]
    fn test_report_flags_permissive_defaults() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[
            ("DEFAULT_NETWORK_ENABLED", "true"),
            ("DEFAULT_MAX_FILES", "300"),
            ("DEFAULT_MAX_BYTES", "104857600"),
        ]));
        let warnings = config.validate_with_report();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("network"));
    }

    #[test]
    fn test_paths() {
        let config = CoordinatorConfig::from_env(&MapEnv::new(&[
            ("REPO_ROOT", "/srv/repo"),
            ("SCENARIOS_DIR", "apps"),
        ]));
        assert_eq!(config.scenario_root("billing"), PathBuf::from("/srv/repo/apps/billing"));
        assert!(config.cli_binary.is_none());
    }
}
