// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Locks
//!
//! A scope lock declares an agent's write interest in one `(scenario, path)`
//! until an explicit expiry. Locks conflict pairwise through the
//! path-overlap predicate: two paths overlap when they are equal or one is
//! a directory prefix of the other.
//!
//! Non-empty scopes are widened with [`SHARED_DEPENDENCY_FILES`] before lock
//! acquisition so that two agents never rewrite the same manifest or
//! lockfile concurrently.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Lock model, overlap predicate, scope expansion

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest and lockfiles nearly every code change touches.
pub const SHARED_DEPENDENCY_FILES: &[&str] = &[
    "go.mod",
    "go.sum",
    "package.json",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "Cargo.toml",
    "Cargo.lock",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "Gemfile",
    "Gemfile.lock",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLock {
    pub agent_id: AgentId,
    pub scenario: String,
    pub path: String,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ScopeLock {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// The existing lock side of a conflict, as returned to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLockInfo {
    pub path: String,
    pub agent_id: AgentId,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One offending `(requested path, existing lock)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetail {
    pub path: String,
    pub locked_by: ScopeLockInfo,
}

impl ConflictDetail {
    pub fn new(requested: &str, lock: &ScopeLock, agent_started_at: DateTime<Utc>) -> Self {
        Self {
            path: requested.to_string(),
            locked_by: ScopeLockInfo {
                path: lock.path.clone(),
                agent_id: lock.agent_id.clone(),
                scenario: lock.scenario.clone(),
                started_at: agent_started_at,
                expires_at: lock.expires_at,
            },
        }
    }
}

fn trim_separator(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

/// Symmetric overlap predicate over scope paths.
///
/// `a/b` overlaps `a`, `a/b` and `a/b/c`; it does not overlap `ab` or `a-b`.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let a = trim_separator(a);
    let b = trim_separator(b);
    if a == b {
        return true;
    }
    let is_dir_prefix = |prefix: &str, path: &str| {
        path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/'
    };
    is_dir_prefix(a, b) || is_dir_prefix(b, a)
}

/// Pairs every requested path with every overlapping lock, requested order first.
pub fn find_conflicts<F>(requested: &[String], locks: &[ScopeLock], started_at: F) -> Vec<ConflictDetail>
where
    F: Fn(&ScopeLock) -> DateTime<Utc>,
{
    let mut conflicts = Vec::new();
    for path in requested {
        for lock in locks {
            if paths_overlap(path, &lock.path) {
                conflicts.push(ConflictDetail::new(path, lock, started_at(lock)));
            }
        }
    }
    conflicts
}

/// Outcome of [`decide_scope_expansion`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeExpansion {
    pub expanded: Vec<String>,
    pub added: Vec<String>,
    pub was_expanded: bool,
    pub reason: &'static str,
}

/// Widens a non-empty scope with the shared dependency files.
///
/// An empty scope already means "the whole scenario" and is left alone.
pub fn decide_scope_expansion(requested: &[String]) -> ScopeExpansion {
    if requested.is_empty() {
        return ScopeExpansion {
            expanded: Vec::new(),
            added: Vec::new(),
            was_expanded: false,
            reason: "empty scope covers the whole scenario; no expansion",
        };
    }

    let mut expanded: Vec<String> = Vec::with_capacity(requested.len() + SHARED_DEPENDENCY_FILES.len());
    for path in requested {
        if !expanded.contains(path) {
            expanded.push(path.clone());
        }
    }
    let mut added = Vec::new();
    for shared in SHARED_DEPENDENCY_FILES {
        if !expanded.iter().any(|p| p == shared) {
            expanded.push(shared.to_string());
            added.push(shared.to_string());
        }
    }

    ScopeExpansion {
        expanded,
        added,
        was_expanded: true,
        reason: "shared dependency files locked alongside declared scope",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(agent: &str, path: &str) -> ScopeLock {
        let now = Utc::now();
        ScopeLock {
            agent_id: AgentId::new(agent),
            scenario: "s".to_string(),
            path: path.to_string(),
            acquired_at: now,
            renewed_at: now,
            expires_at: now + chrono::Duration::minutes(15),
        }
    }

    #[test]
    fn test_overlap_prefix_rules() {
        assert!(paths_overlap("a/b", "a"));
        assert!(paths_overlap("a/b", "a/b/c"));
        assert!(paths_overlap("a/b/", "a/b"));
        assert!(paths_overlap("a", "a"));
        assert!(!paths_overlap("a/b", "ab"));
        assert!(!paths_overlap("a/b", "a-b"));
        assert!(!paths_overlap("api", "apis/x"));
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let paths = ["a", "a/b", "a/b/c", "ab", "a-b", "b"];
        for x in paths {
            for y in paths {
                assert_eq!(paths_overlap(x, y), paths_overlap(y, x), "{x} vs {y}");
            }
        }
    }

    #[test]
    fn test_expansion_of_empty_scope_is_empty() {
        let result = decide_scope_expansion(&[]);
        assert!(result.expanded.is_empty());
        assert!(!result.was_expanded);
    }

    #[test]
    fn test_expansion_contains_requested_and_shared_without_duplicates() {
        let requested = vec![
            "api".to_string(),
            "go.mod".to_string(),
            "api".to_string(),
        ];
        let result = decide_scope_expansion(&requested);
        assert_eq!(result.expanded[0], "api");
        for shared in SHARED_DEPENDENCY_FILES {
            assert!(result.expanded.iter().any(|p| p == shared));
        }
        let mut deduped = result.expanded.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), result.expanded.len());
        assert!(!result.added.contains(&"go.mod".to_string()));
    }

    #[test]
    fn test_find_conflicts_reports_each_pair() {
        let locks = vec![lock("x", "api/foo"), lock("y", "web")];
        let conflicts = find_conflicts(&["api".to_string(), "docs".to_string()], &locks, |l| l.acquired_at);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "api");
        assert_eq!(conflicts[0].locked_by.path, "api/foo");
        assert_eq!(conflicts[0].locked_by.agent_id, AgentId::new("x"));
    }
}
