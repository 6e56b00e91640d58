// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Keeps every scope path an agent asks for inside its scenario directory.
//! Path validation is a core security rule, so it lives in the domain rather
//! than in infrastructure.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Scope-path sandboxing

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Home directory reference not allowed: {0}")]
    HomeReference(String),

    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path outside scenario boundary: {0}")]
    OutsideBoundary(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Validates scope paths relative to a scenario root.
///
/// # Security Guarantees
/// - Rejects `..` components, `~` home references and absolute paths
/// - Rejects null bytes and over-long paths
/// - Normalizes `.` components and backslash separators
/// - The joined path always starts with the scenario root
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Normalize a scope path and resolve it under `scenario_root`.
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - `scenario_root` joined with the normalized path
    /// * `Err(PathSanitizerError)` - Path escapes or is malformed
    ///
    /// # Examples
    /// ```
    /// use test_genie_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let root = Path::new("/repo/scenarios/billing");
    ///
    /// let safe = sanitizer.resolve_in_scenario("./api/handlers", root).unwrap();
    /// assert_eq!(safe, PathBuf::from("/repo/scenarios/billing/api/handlers"));
    ///
    /// assert!(sanitizer.resolve_in_scenario("../other/secrets", root).is_err());
    /// ```
    pub fn resolve_in_scenario(&self, path: &str, scenario_root: &Path) -> Result<PathBuf, PathSanitizerError> {
        let relative = self.normalize(path)?;
        let resolved = scenario_root.join(&relative);
        if !resolved.starts_with(scenario_root) {
            tracing::warn!(path = %path, root = %scenario_root.display(), "Scope path outside scenario boundary");
            return Err(PathSanitizerError::OutsideBoundary(path.to_string()));
        }
        Ok(resolved)
    }

    /// Normalize a relative scope path without touching the filesystem.
    pub fn normalize(&self, path: &str) -> Result<PathBuf, PathSanitizerError> {
        self.validate(path)?;

        let unified = path.replace('\\', "/");
        if unified.starts_with('~') || unified.contains("$HOME") {
            tracing::warn!(path = %path, "Scope path references home directory");
            return Err(PathSanitizerError::HomeReference(path.to_string()));
        }

        let path_buf = PathBuf::from(&unified);
        if path_buf.is_absolute() || unified.starts_with('/') {
            return Err(PathSanitizerError::AbsolutePath(path.to_string()));
        }

        let mut normalized = PathBuf::new();
        for component in path_buf.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    tracing::warn!(path = %path, "Path traversal attempt detected: contains '..' component");
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(PathSanitizerError::AbsolutePath(path.to_string()));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(PathSanitizerError::InvalidPath(format!("'{path}' resolves to the scenario root")));
        }
        Ok(normalized)
    }

    /// Lightweight check before full normalization.
    pub fn validate(&self, path: &str) -> Result<(), PathSanitizerError> {
        if path.trim().is_empty() {
            return Err(PathSanitizerError::InvalidPath("empty path".to_string()));
        }
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }
        if path.contains('\0') {
            tracing::warn!(path = %path, "Path contains null byte (potential security issue)");
            return Err(PathSanitizerError::InvalidPath("Path contains null byte".to_string()));
        }
        Ok(())
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/repo/scenarios/billing";

    fn resolve(path: &str) -> Result<PathBuf, PathSanitizerError> {
        PathSanitizer::new().resolve_in_scenario(path, Path::new(ROOT))
    }

    #[test]
    fn test_simple_path() {
        assert_eq!(resolve("api/file.go").unwrap(), PathBuf::from("/repo/scenarios/billing/api/file.go"));
    }

    #[test]
    fn test_normalize_current_dir_and_backslashes() {
        assert_eq!(resolve("./api/./v1").unwrap(), PathBuf::from("/repo/scenarios/billing/api/v1"));
        assert_eq!(resolve("api\\v1").unwrap(), PathBuf::from("/repo/scenarios/billing/api/v1"));
    }

    #[test]
    fn test_reject_parent_dir() {
        assert!(matches!(resolve("api/../../other"), Err(PathSanitizerError::PathTraversal(_))));
        assert!(matches!(resolve("..\\secrets"), Err(PathSanitizerError::PathTraversal(_))));
    }

    #[test]
    fn test_reject_home_and_absolute() {
        assert!(matches!(resolve("~/.ssh"), Err(PathSanitizerError::HomeReference(_))));
        assert!(matches!(resolve("$HOME/.aws"), Err(PathSanitizerError::HomeReference(_))));
        assert!(matches!(resolve("/etc/passwd"), Err(PathSanitizerError::AbsolutePath(_))));
    }

    #[test]
    fn test_reject_empty_null_and_root() {
        assert!(resolve("").is_err());
        assert!(resolve("a\0b").is_err());
        assert!(matches!(resolve("."), Err(PathSanitizerError::InvalidPath(_))));
    }

    #[test]
    fn test_path_too_long() {
        let sanitizer = PathSanitizer::with_max_length(10);
        let result = sanitizer.normalize("very/long/path/that/exceeds");
        assert!(matches!(result, Err(PathSanitizerError::PathTooLong(_))));
    }
}
