// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod coordinator;
pub mod execution_builder;
pub mod repository_factory;
pub mod spawn;

pub use coordinator::{CoordinatorService, HostSeams};
pub use execution_builder::{ExecutionBuilder, ExecutionBuilderInput, ExecutionBuilderResult};
pub use spawn::{SpawnError, SpawnOutcome, SpawnResponse, SpawnService};
