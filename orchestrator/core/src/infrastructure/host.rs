// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Production implementations of the host seams, plus a manually driven
//! clock for tests and simulations.

use crate::domain::host::{Clock, EnvironmentProvider, ProcessChecker};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Signal-0 liveness probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessChecker;

impl ProcessChecker for OsProcessChecker {
    #[cfg(unix)]
    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs permission and existence checks only.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: i32) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsEnvironment;

impl EnvironmentProvider for OsEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn hostname(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_alive() {
        let checker = OsProcessChecker;
        assert!(checker.is_alive(std::process::id() as i32));
        assert!(!checker.is_alive(0));
        assert!(!checker.is_alive(-1));
    }

    #[test]
    fn test_hostname_is_not_empty() {
        assert!(!OsEnvironment.hostname().is_empty());
    }
}
