// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! OS-level sandbox preparation for an agent subprocess.
//!
//! Preparation runs after the execution config is built and before the
//! command is started. A failure never blocks the spawn; the caller consults
//! `decide_on_containment_failure` and runs the agent unsandboxed.

use crate::domain::execution::ExecutionConfig;
use async_trait::async_trait;

#[async_trait]
pub trait ContainmentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Adjust the config (wrapper command, env) for the sandbox.
    async fn prepare(&self, config: &mut ExecutionConfig) -> Result<(), ContainmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ContainmentError {
    #[error("containment provider unavailable: {0}")]
    Unavailable(String),

    #[error("containment setup failed: {0}")]
    Setup(String),
}
