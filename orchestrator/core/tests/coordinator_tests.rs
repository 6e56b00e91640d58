// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Coordinator lifecycle: orphan recovery, stop semantics, capacity,
//! overlap boundaries, retention and the file-operation audit trail.

mod common;

use common::{Harness, HOST, SCENARIO, WAIT_FOR_RELEASE};
use test_genie_core::domain::agent::{AgentFilter, AgentId, AgentStatus, AgentUpdate, CreateAgentInput};
use test_genie_core::domain::config::CoordinatorConfig;
use test_genie_core::domain::degradation::decide_on_heartbeat_failure;
use test_genie_core::domain::error::CoordinatorError;
use test_genie_core::domain::failure::{FailureCategory, FailureCode, FailureInfo};
use test_genie_core::domain::file_operation::{FileOperationKind, NewFileOperation};
use test_genie_core::domain::host::Clock;
use test_genie_core::domain::repository::{AgentRepository, ScopeLockRepository};

fn input(prompt: &str, scope: &[&str]) -> CreateAgentInput {
    CreateAgentInput {
        scenario: SCENARIO.to_string(),
        scope: scope.iter().map(|p| p.to_string()).collect(),
        model: "M".to_string(),
        prompt: prompt.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_orphan_sweep_fails_dead_local_agent() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let orphan = h.seed_running("long task", Some(99999), &["api"]).await;

    let restarted = h.restarted_coordinator();
    let report = restarted.start().await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.orphaned, vec![orphan.id.clone()]);
    let agent = restarted.get_agent(&orphan.id).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Failed);
    assert!(agent.error.unwrap().contains("process 99999 no longer running"));
    assert!(agent.completed_at.is_some());
    assert_eq!(h.locks_for(&orphan.id).await, 0);

    restarted.shutdown().await;
}

#[tokio::test]
async fn test_orphan_sweep_keeps_live_and_fails_unowned_agents() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let live = h.seed_running("still running", Some(4242), &[]).await;
    h.host.set_alive(4242);
    let no_pid = h.seed_running("never started", None, &[]).await;

    let mut remote = h.seed_running("elsewhere", Some(4242), &[]).await;
    remote = h
        .repo
        .update_agent(
            &remote.id,
            &AgentUpdate {
                hostname: Some("other-host".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_ne!(remote.hostname.as_deref(), Some(HOST));

    let report = h.restarted_coordinator().reconcile_orphans().await;
    assert_eq!(report.checked, 3);
    assert_eq!(report.alive, 1);
    assert_eq!(report.orphaned.len(), 2);

    let live = h.coordinator.get_agent(&live.id).await.unwrap();
    assert_eq!(live.status, AgentStatus::Running);
    let no_pid = h.coordinator.get_agent(&no_pid.id).await.unwrap();
    assert_eq!(no_pid.error.as_deref(), Some("server restarted while agent was active"));
    let remote = h.coordinator.get_agent(&remote.id).await.unwrap();
    assert_eq!(remote.status, AgentStatus::Failed);
}

#[tokio::test]
async fn test_stop_twice_reports_not_running() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let agent = h.seed_running("stop me", Some(4242), &["api"]).await;

    let stopped = h.coordinator.stop(&agent.id).await.unwrap();
    assert_eq!(stopped.status, AgentStatus::Stopped);
    assert_eq!(stopped.error.as_deref(), Some("stopped by user"));
    assert_eq!(h.locks_for(&agent.id).await, 0);

    let err = h.coordinator.stop(&agent.id).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NotRunning {
            status: AgentStatus::Stopped,
            ..
        }
    ));
    assert!(err.to_string().contains("not running"));
    assert_eq!(err.failure_info().to_http_status(), 400);
}

#[tokio::test]
async fn test_stop_unknown_agent_is_not_found() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let err = h
        .coordinator
        .stop(&AgentId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AgentNotFound(_)));
    assert_eq!(err.failure_info().to_http_status(), 404);
}

#[tokio::test]
async fn test_stop_all_stops_every_active_agent() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let a = h.seed_running("a", Some(1), &[]).await;
    let b = h.seed_running("b", Some(2), &[]).await;

    let report = h.coordinator.stop_all().await.unwrap();
    assert_eq!(report.stopped.len(), 2);
    assert!(report.failed.is_empty());
    for id in [&a.id, &b.id] {
        assert_eq!(h.coordinator.get_agent(id).await.unwrap().status, AgentStatus::Stopped);
    }
    assert!(h
        .repo
        .list_agents(&AgentFilter::active())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_register_enforces_capacity() {
    let h = Harness::with_config(WAIT_FOR_RELEASE, |c| c.max_concurrent_agents = 1);
    h.seed_running("busy", Some(1), &[]).await;

    let err = h.coordinator.register(input("another", &[])).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::CapacityExceeded { active: 1, max: 1 }));
    assert_eq!(err.failure_info().retry_after_seconds, Some(30));
}

#[tokio::test]
async fn test_register_expands_scope_and_terminal_update_releases_locks() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let agent = h.coordinator.register(input("tests for api", &["api"])).await.unwrap();

    assert_eq!(agent.status, AgentStatus::Pending);
    assert_eq!(agent.scope, vec!["api".to_string()]);
    let locks = h.repo.get_locks_for_agent(&agent.id).await.unwrap();
    assert!(locks.iter().any(|l| l.path == "api"));
    assert!(locks.iter().any(|l| l.path == "go.mod"));
    let expected_expiry = h.clock.now() + chrono::Duration::minutes(h.config.lock_timeout_minutes as i64);
    assert!(locks.iter().all(|l| l.expires_at == expected_expiry));

    let done = h
        .coordinator
        .update_status(&agent.id, AgentUpdate::status(AgentStatus::Completed))
        .await
        .unwrap();
    assert_eq!(done.status, AgentStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(h.locks_for(&agent.id).await, 0);
}

#[tokio::test]
async fn test_update_status_of_missing_agent_fails() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let err = h
        .coordinator
        .update_status(
            &AgentId::new("ghost"),
            AgentUpdate::status(AgentStatus::Failed),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AgentNotFound(_)));
}

#[tokio::test]
async fn test_overlap_boundaries() {
    for (existing, overlaps) in [("a", true), ("a/b", true), ("a/b/c", true), ("ab", false), ("a-b", false)] {
        let h = Harness::new(WAIT_FOR_RELEASE);
        let holder = h.seed_running("holder", Some(1), &[existing]).await;

        let conflicts = h
            .coordinator
            .preview_conflicts(SCENARIO, &["a/b".to_string()])
            .await
            .unwrap();

        let hit = conflicts
            .iter()
            .any(|c| c.path == "a/b" && c.locked_by.path == existing && c.locked_by.agent_id == holder.id);
        assert_eq!(hit, overlaps, "a/b against existing lock {existing}");
    }
}

#[tokio::test]
async fn test_released_locks_no_longer_conflict() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let agent = h.seed_running("x", Some(1), &["api", "web"]).await;
    assert_eq!(
        h.repo.get_locks_for_scenario(SCENARIO).await.unwrap().len(),
        2
    );

    h.repo.release_locks(&agent.id).await.unwrap();
    let conflicts = h
        .repo
        .check_conflicts(SCENARIO, &["api".to_string(), "web".to_string()])
        .await
        .unwrap();
    assert!(conflicts.is_empty());
}

#[tokio::test]
async fn test_expired_locks_do_not_block_admission() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    h.seed_running("stale", Some(1), &["api"]).await;
    h.clock.advance(chrono::Duration::minutes(16));

    let agent = h.coordinator.register(input("fresh", &["api"])).await.unwrap();
    assert!(h.locks_for(&agent.id).await > 0);
}

#[tokio::test]
async fn test_renew_locks_pushes_expiry() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let agent = h.coordinator.register(input("renew", &["api"])).await.unwrap();

    h.clock.advance(chrono::Duration::minutes(10));
    let renewed = h.coordinator.renew_locks(&agent.id).await.unwrap();
    assert_eq!(renewed as usize, h.locks_for(&agent.id).await);

    let expected = h.clock.now() + chrono::Duration::minutes(h.config.lock_timeout_minutes as i64);
    let locks = h.repo.get_locks_for_agent(&agent.id).await.unwrap();
    assert!(locks.iter().all(|l| l.expires_at == expected));
}

#[test]
fn test_heartbeat_failures_escalate_on_third_strike() {
    let config = CoordinatorConfig {
        max_heartbeat_failures: 3,
        ..Default::default()
    };
    let failure = FailureInfo::new(
        FailureCategory::Transient,
        FailureCode::DatabaseConnection,
        "connection refused",
    );

    let first = decide_on_heartbeat_failure(&failure, 1, config.max_heartbeat_failures);
    let second = decide_on_heartbeat_failure(&failure, 2, config.max_heartbeat_failures);
    let third = decide_on_heartbeat_failure(&failure, 3, config.max_heartbeat_failures);

    assert!(first.should_continue);
    assert!(second.should_continue);
    assert!(!third.should_continue);
    assert!(third.warning_for_user.contains("connection issues"));
}

#[tokio::test]
async fn test_retention_cleanup_removes_old_terminal_agents() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let old = h.seed_running("old", Some(1), &[]).await;
    h.coordinator.stop(&old.id).await.unwrap();

    h.clock.advance(chrono::Duration::days(h.config.retention_days as i64 + 1));
    let fresh = h.seed_running("fresh", Some(2), &[]).await;

    let report = h.coordinator.run_cleanup().await;
    assert_eq!(report.agents_deleted, 1);
    assert!(matches!(
        h.coordinator.get_agent(&old.id).await,
        Err(CoordinatorError::AgentNotFound(_))
    ));
    assert_eq!(h.coordinator.get_agent(&fresh.id).await.unwrap().status, AgentStatus::Running);
}

#[tokio::test]
async fn test_file_operations_are_audited_per_agent() {
    let h = Harness::new(WAIT_FOR_RELEASE);
    let agent = h.seed_running("edit", Some(1), &["api"]).await;

    let recorded = h
        .coordinator
        .record_file_operation(NewFileOperation {
            agent_id: agent.id.clone(),
            scenario: String::new(),
            operation: FileOperationKind::Modify,
            path: "api/handler.go".to_string(),
            content_before: Some("old".to_string()),
            content_after: Some("new".to_string()),
            content_hash: None,
        })
        .await
        .unwrap();
    assert_eq!(recorded.scenario, SCENARIO);

    let wrong_scenario = h
        .coordinator
        .record_file_operation(NewFileOperation {
            agent_id: agent.id.clone(),
            scenario: "other".to_string(),
            operation: FileOperationKind::Create,
            path: "x".to_string(),
            content_before: None,
            content_after: None,
            content_hash: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(wrong_scenario, CoordinatorError::Validation(_)));

    let ops = h.coordinator.file_operations_for_agent(&agent.id, None).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].path, "api/handler.go");
    let by_scenario = h
        .coordinator
        .file_operations_for_scenario(SCENARIO, Some(10))
        .await
        .unwrap();
    assert_eq!(by_scenario.len(), 1);

    let err = h.coordinator.delete_agent(&agent.id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation(_)));

    h.coordinator.stop(&agent.id).await.unwrap();
    h.coordinator.delete_agent(&agent.id).await.unwrap();
    assert!(h
        .coordinator
        .file_operations_for_scenario(SCENARIO, None)
        .await
        .unwrap()
        .is_empty());
}
