// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod containment;
pub mod db;
pub mod host;
pub mod process;
pub mod providers;
pub mod repositories;
pub mod safety;

pub use containment::NoopContainment;
pub use host::{ManualClock, OsEnvironment, OsProcessChecker, SystemClock};
pub use providers::{ClaudeCodeProvider, ProviderSelection, ProviderSelector};
pub use repositories::{InMemoryCoordinationRepository, PostgresCoordinationRepository};
pub use safety::DefaultSafetyValidator;
