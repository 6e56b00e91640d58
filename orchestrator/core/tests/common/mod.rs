// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared harness for coordinator integration tests.
//!
//! Wires a real `CoordinatorService` and `SpawnService` against the
//! in-memory store, a manual clock and a scripted host. Agents are `sh -c`
//! scripts run inside a temporary scenario directory.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;

use test_genie_core::application::{CoordinatorService, HostSeams, SpawnOutcome, SpawnResponse, SpawnService};
use test_genie_core::domain::agent::{Agent, AgentId, AgentStatus, CreateAgentInput};
use test_genie_core::domain::config::CoordinatorConfig;
use test_genie_core::domain::host::{Clock, EnvironmentProvider, ProcessChecker};
use test_genie_core::domain::provider::{ExecutionParams, ExecutionProvider, ProviderAvailability, ProviderError};
use test_genie_core::domain::repository::{AgentRepository, ScopeLockRepository};
use test_genie_core::domain::security::SecurityValidator;
use test_genie_core::domain::validation::SpawnRequest;
use test_genie_core::infrastructure::{
    DefaultSafetyValidator, InMemoryCoordinationRepository, ManualClock, NoopContainment, ProviderSelector,
};

pub const SCENARIO: &str = "S";
pub const HOST: &str = "genie-test-host";

/// Blocks until the scenario directory contains a `release` file.
pub const WAIT_FOR_RELEASE: &str = "while [ ! -f release ]; do sleep 0.05; done";

/// Process table and environment under test control.
pub struct FakeHost {
    hostname: String,
    alive: Mutex<HashSet<i32>>,
}

impl FakeHost {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            alive: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_alive(&self, pid: i32) {
        self.alive.lock().insert(pid);
    }
}

impl ProcessChecker for FakeHost {
    fn is_alive(&self, pid: i32) -> bool {
        self.alive.lock().contains(&pid)
    }
}

impl EnvironmentProvider for FakeHost {
    fn var(&self, _key: &str) -> Option<String> {
        None
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

/// Runs a fixed shell script in the agent's working directory.
pub struct ScriptProvider {
    script: String,
}

impl ScriptProvider {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
        }
    }
}

#[async_trait]
impl ExecutionProvider for ScriptProvider {
    fn name(&self) -> &str {
        "script"
    }

    async fn is_available(&self) -> ProviderAvailability {
        ProviderAvailability::available(PathBuf::from("/bin/sh"))
    }

    fn build_command(&self, params: &ExecutionParams) -> Result<tokio::process::Command, ProviderError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&self.script).envs(&params.env);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    fn extract_session_id(&self, output: &str) -> Option<String> {
        output
            .lines()
            .find_map(|line| line.strip_prefix("session: "))
            .map(str::to_string)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: CoordinatorConfig,
    pub clock: Arc<ManualClock>,
    pub host: Arc<FakeHost>,
    pub repo: Arc<InMemoryCoordinationRepository>,
    pub coordinator: Arc<CoordinatorService>,
    pub spawn: Arc<SpawnService>,
}

impl Harness {
    pub fn new(script: &str) -> Self {
        Self::with_config(script, |_| {})
    }

    pub fn with_config(script: &str, configure: impl FnOnce(&mut CoordinatorConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scenarios").join(SCENARIO)).unwrap();

        let mut config = CoordinatorConfig {
            repo_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        configure(&mut config);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let host = Arc::new(FakeHost::new(HOST));
        let repo = Arc::new(InMemoryCoordinationRepository::with_clock(clock.clone()));
        let coordinator = Self::coordinator_on(&repo, &config, &clock, &host);

        let provider: Arc<dyn ExecutionProvider> = Arc::new(ScriptProvider::new(script));
        let safety = DefaultSafetyValidator::new().unwrap();
        let spawn = Arc::new(SpawnService::new(
            coordinator.clone(),
            ProviderSelector::new(vec![provider]),
            SecurityValidator::new(Arc::new(safety)),
            Arc::new(NoopContainment),
        ));

        Self {
            dir,
            config,
            clock,
            host,
            repo,
            coordinator,
            spawn,
        }
    }

    /// A second coordinator over the same store, as after a restart.
    pub fn restarted_coordinator(&self) -> Arc<CoordinatorService> {
        Self::coordinator_on(&self.repo, &self.config, &self.clock, &self.host)
    }

    fn coordinator_on(
        repo: &Arc<InMemoryCoordinationRepository>,
        config: &CoordinatorConfig,
        clock: &Arc<ManualClock>,
        host: &Arc<FakeHost>,
    ) -> Arc<CoordinatorService> {
        let seams = HostSeams {
            clock: clock.clone(),
            processes: host.clone(),
            env: host.clone(),
        };
        Arc::new(CoordinatorService::new(repo.clone(), config.clone(), seams))
    }

    pub fn scenario_dir(&self) -> PathBuf {
        self.dir.path().join("scenarios").join(SCENARIO)
    }

    /// Let every `WAIT_FOR_RELEASE` agent exit.
    pub fn release_agents(&self) {
        std::fs::write(self.scenario_dir().join("release"), b"").unwrap();
    }

    /// Insert an agent that looks like it is running on `HOST`.
    pub async fn seed_running(&self, prompt: &str, pid: Option<i32>, locks: &[&str]) -> Agent {
        let input = CreateAgentInput {
            scenario: SCENARIO.to_string(),
            scope: locks.iter().map(|p| p.to_string()).collect(),
            model: "M".to_string(),
            prompt: prompt.to_string(),
            ..Default::default()
        };
        let mut agent = Agent::pending(&input, AgentId::generate(), self.clock.now());
        agent.status = AgentStatus::Running;
        agent.pid = pid;
        agent.hostname = Some(HOST.to_string());
        let agent = self.repo.create_agent(&agent).await.unwrap();

        if !locks.is_empty() {
            let paths: Vec<String> = locks.iter().map(|p| p.to_string()).collect();
            let expires = self.clock.now() + chrono::Duration::minutes(15);
            self.repo
                .acquire_locks(&agent.id, SCENARIO, &paths, expires)
                .await
                .unwrap();
        }
        agent
    }

    pub async fn locks_for(&self, id: &AgentId) -> usize {
        self.repo.get_locks_for_agent(id).await.unwrap().len()
    }
}

pub fn request(prompts: &[&str], scope: &[&str]) -> SpawnRequest {
    SpawnRequest {
        prompts: prompts.iter().map(|p| p.to_string()).collect(),
        model: "M".to_string(),
        scenario: SCENARIO.to_string(),
        scope: scope.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

pub fn spawned(outcome: SpawnOutcome) -> SpawnResponse {
    match outcome {
        SpawnOutcome::Spawned(response) => response,
        SpawnOutcome::Cached(payload) => panic!("expected a fresh spawn, got cached payload {payload}"),
    }
}

/// Poll until `agent` reaches a terminal status.
pub async fn wait_terminal(coordinator: &CoordinatorService, id: &AgentId) -> Agent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let agent = coordinator.get_agent(id).await.unwrap();
        if agent.status.is_terminal() {
            return agent;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "agent {id} still {} after 10s",
            agent.status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Poll until no subprocess is owned by `coordinator`.
pub async fn wait_idle(coordinator: &CoordinatorService) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while coordinator.running_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "agents still running after 10s");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
