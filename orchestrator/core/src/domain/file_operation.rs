// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Append-only audit record of a file mutation reported by a running agent.

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationKind {
    Create,
    Modify,
    Delete,
}

impl FileOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperationKind::Create => "create",
            FileOperationKind::Modify => "modify",
            FileOperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for FileOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileOperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(FileOperationKind::Create),
            "modify" => Ok(FileOperationKind::Modify),
            "delete" => Ok(FileOperationKind::Delete),
            other => Err(format!("unknown file operation: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperation {
    pub id: i64,
    pub agent_id: AgentId,
    pub scenario: String,
    pub operation: FileOperationKind,
    pub path: String,
    pub content_before: Option<String>,
    pub content_after: Option<String>,
    pub content_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileOperation {
    pub agent_id: AgentId,
    pub scenario: String,
    pub operation: FileOperationKind,
    pub path: String,
    #[serde(default)]
    pub content_before: Option<String>,
    #[serde(default)]
    pub content_after: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
}
