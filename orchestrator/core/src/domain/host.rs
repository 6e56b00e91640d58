// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host seams
//!
//! Single-method interfaces over the clock, process table and environment so
//! tests can substitute deterministic implementations. Production
//! implementations live in `crate::infrastructure::host`.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub trait ProcessChecker: Send + Sync {
    /// Whether a process with this pid exists on the local host.
    fn is_alive(&self, pid: i32) -> bool;
}

pub trait EnvironmentProvider: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    fn hostname(&self) -> String;
}
