// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Provider
//!
//! Domain interface for the external agent CLIs that do the actual work.
//! All CLI-specific argument shapes live behind this trait; a new backend is
//! added by implementing its four methods.
//!
//! Implementations in `crate::infrastructure::providers`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer over agent CLIs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Stable identifier for logs.
    fn name(&self) -> &str;

    /// Cheap check that the backing CLI can be invoked.
    async fn is_available(&self) -> ProviderAvailability;

    /// Construct, but do not start, the subprocess.
    fn build_command(&self, params: &ExecutionParams) -> Result<tokio::process::Command, ProviderError>;

    /// Parse the provider-specific session announcement from output.
    fn extract_session_id(&self, output: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAvailability {
    pub available: bool,
    pub binary_path: Option<PathBuf>,
    pub reason: Option<String>,
}

impl ProviderAvailability {
    pub fn available(binary_path: PathBuf) -> Self {
        Self {
            available: true,
            binary_path: Some(binary_path),
            reason: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            binary_path: None,
            reason: Some(reason.into()),
        }
    }
}

/// Everything a provider needs to translate into CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionParams {
    pub prompt: String,
    pub model: String,
    /// Backend selector, e.g. `anthropic`, `bedrock`, `vertex`. Empty means
    /// the provider default.
    pub provider: Option<String>,
    pub allowed_tools: Vec<String>,
    pub max_turns: u32,
    pub timeout_seconds: u64,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid execution params: {0}")]
    InvalidParams(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
