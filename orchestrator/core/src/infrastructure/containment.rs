// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::containment::{ContainmentError, ContainmentProvider};
use crate::domain::execution::ExecutionConfig;
use async_trait::async_trait;

/// Runs agents without an OS sandbox. Network policy is still passed to the
/// agent through its environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContainment;

#[async_trait]
impl ContainmentProvider for NoopContainment {
    fn name(&self) -> &str {
        "none"
    }

    async fn prepare(&self, _config: &mut ExecutionConfig) -> Result<(), ContainmentError> {
        Ok(())
    }
}
