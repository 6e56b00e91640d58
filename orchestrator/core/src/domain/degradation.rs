// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Degradation decisions
//!
//! Small pure functions that turn a classified failure into a continue/stop
//! directive. A failure is recovered locally only when one of these says so.

use crate::domain::failure::{FailureCategory, FailureCode, FailureInfo};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradationDecision {
    pub should_continue: bool,
    pub reason: String,
    /// Empty when the degradation is silent.
    pub warning_for_user: String,
    pub original: FailureInfo,
}

impl DegradationDecision {
    fn proceed(reason: impl Into<String>, warning: impl Into<String>, original: &FailureInfo) -> Self {
        Self {
            should_continue: true,
            reason: reason.into(),
            warning_for_user: warning.into(),
            original: original.clone(),
        }
    }

    fn stop(reason: impl Into<String>, warning: impl Into<String>, original: &FailureInfo) -> Self {
        Self {
            should_continue: false,
            reason: reason.into(),
            warning_for_user: warning.into(),
            original: original.clone(),
        }
    }
}

/// The agent runs without an OS sandbox.
pub fn decide_on_containment_failure(failure: &FailureInfo) -> DegradationDecision {
    DegradationDecision::proceed(
        "containment unavailable; running without OS sandbox",
        "Agent is running without OS-level sandboxing",
        failure,
    )
}

/// Tolerate renewal failures until `consecutive_failures` reaches `max_failures`.
pub fn decide_on_heartbeat_failure(
    failure: &FailureInfo,
    consecutive_failures: u32,
    max_failures: u32,
) -> DegradationDecision {
    if consecutive_failures < max_failures {
        return DegradationDecision::proceed(
            format!("heartbeat failed ({consecutive_failures}/{max_failures}); will retry"),
            "",
            failure,
        );
    }
    DegradationDecision::stop(
        format!("heartbeat failed {consecutive_failures} consecutive times"),
        "Agent stopped: lost contact with the coordination store (connection issues). Its scope locks may have expired.",
        failure,
    )
}

pub fn decide_on_session_tracking_failure(failure: &FailureInfo) -> DegradationDecision {
    DegradationDecision::proceed("session tracking failed; continuing without it", "", failure)
}

pub fn decide_on_registration_failure(failure: &FailureInfo) -> DegradationDecision {
    match failure.code {
        FailureCode::ScopeConflict | FailureCode::DuplicateAgent => {
            DegradationDecision::stop("admission rejected", failure.message.clone(), failure)
        }
        _ if failure.category == FailureCategory::Transient => {
            let hint = match failure.retry_after_seconds {
                Some(seconds) => format!("Temporary coordination problem; retry in {seconds}s"),
                None => "Temporary coordination problem; retry shortly".to_string(),
            };
            DegradationDecision::stop("transient registration failure", hint, failure)
        }
        _ => DegradationDecision::stop("registration failed", failure.message.clone(), failure),
    }
}

/// Process failures are always terminal for the agent.
pub fn decide_on_process_failure(failure: &FailureInfo) -> DegradationDecision {
    let warning = match failure.code {
        FailureCode::ProcessTimeout => {
            "Agent exceeded its time limit. Consider breaking the work into smaller prompts."
        }
        FailureCode::ProcessStartFailed => {
            "Agent CLI could not be started. Make sure it is installed and on PATH."
        }
        FailureCode::ProcessCanceled => "Agent was canceled. Spawn it again to resume the work.",
        FailureCode::ProcessExitFailed => "Agent exited with an error. Check its output for details.",
        _ => "Agent failed unexpectedly.",
    };
    DegradationDecision::stop(format!("process failure: {}", failure.code), warning, failure)
}

pub fn decide_on_orphan_cleanup_failure(failure: &FailureInfo) -> DegradationDecision {
    DegradationDecision::proceed("orphan cleanup is best effort", "", failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::CoordinatorError;
    use crate::domain::failure::classify_error;

    fn transient() -> FailureInfo {
        classify_error(Some(&CoordinatorError::LockAcquisition("api".into())))
    }

    #[test]
    fn test_heartbeat_escalation() {
        let failure = transient();
        assert!(decide_on_heartbeat_failure(&failure, 1, 3).should_continue);
        assert!(decide_on_heartbeat_failure(&failure, 2, 3).should_continue);
        let third = decide_on_heartbeat_failure(&failure, 3, 3);
        assert!(!third.should_continue);
        assert!(third.warning_for_user.contains("connection issues"));
    }

    #[test]
    fn test_best_effort_decisions_continue() {
        let failure = FailureInfo::containment_unavailable("bwrap missing");
        assert!(decide_on_containment_failure(&failure).should_continue);
        assert!(decide_on_session_tracking_failure(&failure).should_continue);
        assert!(decide_on_session_tracking_failure(&failure).warning_for_user.is_empty());
        assert!(decide_on_orphan_cleanup_failure(&failure).should_continue);
    }

    #[test]
    fn test_registration_failures_stop() {
        let retry = decide_on_registration_failure(&transient());
        assert!(!retry.should_continue);
        assert!(retry.warning_for_user.contains("retry in 2s"));

        let conflict = classify_error(Some(&CoordinatorError::ScopeConflict(vec![])));
        let decision = decide_on_registration_failure(&conflict);
        assert!(!decision.should_continue);
        assert_eq!(decision.warning_for_user, conflict.message);
    }

    #[test]
    fn test_process_failure_messages() {
        let timeout = decide_on_process_failure(&FailureInfo::process_timeout(60));
        assert!(!timeout.should_continue);
        assert!(timeout.warning_for_user.contains("smaller prompts"));
        let start = decide_on_process_failure(&FailureInfo::process_start_failed("enoent"));
        assert!(start.warning_for_user.contains("installed"));
        let canceled = decide_on_process_failure(&FailureInfo::process_canceled("token"));
        assert!(canceled.warning_for_user.contains("Spawn it again"));
    }
}
