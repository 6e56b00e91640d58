// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Execution Provider Selection
//
// Picks the first available agent CLI from an ordered candidate list, falling
// back to a designated provider when none of the candidates answer.

pub mod claude;

pub use claude::ClaudeCodeProvider;

use crate::domain::provider::ExecutionProvider;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a selection round.
pub struct ProviderSelection {
    pub provider: Option<Arc<dyn ExecutionProvider>>,
    pub available: bool,
    pub used_fallback: bool,
    pub reason: Option<String>,
}

impl std::fmt::Debug for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelection")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("available", &self.available)
            .field("used_fallback", &self.used_fallback)
            .field("reason", &self.reason)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ProviderSelector {
    candidates: Vec<Arc<dyn ExecutionProvider>>,
    fallback: Option<Arc<dyn ExecutionProvider>>,
}

impl ProviderSelector {
    pub fn new(candidates: Vec<Arc<dyn ExecutionProvider>>) -> Self {
        Self {
            candidates,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ExecutionProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Default production wiring: the Claude Code CLI, optionally at an
    /// overridden binary path.
    pub fn claude(cli_binary: Option<&str>) -> Self {
        let provider: Arc<dyn ExecutionProvider> = match cli_binary {
            Some(binary) => Arc::new(ClaudeCodeProvider::with_binary(binary)),
            None => Arc::new(ClaudeCodeProvider::new()),
        };
        Self::new(vec![provider])
    }

    pub async fn select_provider(&self) -> ProviderSelection {
        let mut reasons = Vec::new();
        for candidate in &self.candidates {
            let availability = candidate.is_available().await;
            if availability.available {
                debug!(provider = candidate.name(), path = ?availability.binary_path, "selected provider");
                return ProviderSelection {
                    provider: Some(candidate.clone()),
                    available: true,
                    used_fallback: false,
                    reason: None,
                };
            }
            let reason = availability.reason.unwrap_or_else(|| "unavailable".to_string());
            debug!(provider = candidate.name(), %reason, "provider unavailable");
            reasons.push(format!("{}: {}", candidate.name(), reason));
        }

        if let Some(fallback) = &self.fallback {
            let availability = fallback.is_available().await;
            if availability.available {
                info!(provider = fallback.name(), "using fallback provider");
                return ProviderSelection {
                    provider: Some(fallback.clone()),
                    available: true,
                    used_fallback: true,
                    reason: Some(reasons.join("; ")).filter(|r| !r.is_empty()),
                };
            }
            reasons.push(format!(
                "{}: {}",
                fallback.name(),
                availability.reason.unwrap_or_else(|| "unavailable".to_string())
            ));
        }

        let reason = if reasons.is_empty() {
            "no execution providers configured".to_string()
        } else {
            reasons.join("; ")
        };
        warn!(%reason, "no execution provider available");
        ProviderSelection {
            provider: None,
            available: false,
            used_fallback: false,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{ExecutionParams, ProviderAvailability, ProviderError};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FakeProvider {
        name: &'static str,
        available: bool,
    }

    #[async_trait]
    impl ExecutionProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn is_available(&self) -> ProviderAvailability {
            if self.available {
                ProviderAvailability::available(PathBuf::from("/usr/bin/true"))
            } else {
                ProviderAvailability::unavailable("not installed")
            }
        }

        fn build_command(&self, _params: &ExecutionParams) -> Result<tokio::process::Command, ProviderError> {
            Ok(tokio::process::Command::new("true"))
        }

        fn extract_session_id(&self, _output: &str) -> Option<String> {
            None
        }
    }

    fn fake(name: &'static str, available: bool) -> Arc<dyn ExecutionProvider> {
        Arc::new(FakeProvider { name, available })
    }

    #[tokio::test]
    async fn test_first_available_candidate_wins() {
        let selector = ProviderSelector::new(vec![fake("a", false), fake("b", true), fake("c", true)]);
        let selection = selector.select_provider().await;
        assert!(selection.available);
        assert!(!selection.used_fallback);
        assert_eq!(selection.provider.unwrap().name(), "b");
    }

    #[tokio::test]
    async fn test_fallback_used_when_candidates_unavailable() {
        let selector = ProviderSelector::new(vec![fake("a", false)]).with_fallback(fake("backup", true));
        let selection = selector.select_provider().await;
        assert!(selection.available);
        assert!(selection.used_fallback);
        assert_eq!(selection.provider.unwrap().name(), "backup");
        assert!(selection.reason.unwrap().contains("not installed"));
    }

    #[tokio::test]
    async fn test_nothing_available() {
        let selection = ProviderSelector::new(vec![fake("a", false)])
            .with_fallback(fake("backup", false))
            .select_provider()
            .await;
        assert!(!selection.available);
        assert!(selection.provider.is_none());

        let empty = ProviderSelector::default().select_provider().await;
        assert_eq!(empty.reason.as_deref(), Some("no execution providers configured"));
    }
}
