// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the test-genie CLI

pub mod config;
pub mod migrate;
pub mod serve;

pub use self::config::ConfigCommand;
pub use self::migrate::MigrateArgs;
pub use self::serve::ServeArgs;

use clap::Args;
use test_genie_core::domain::repository::{PostgresConfig, StorageBackend};

/// Storage flags shared by `serve` and `migrate`.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// PostgreSQL connection string; the in-memory store is used when unset
    #[arg(long, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Maximum pooled database connections
    #[arg(long, env = "TEST_GENIE_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

impl StorageArgs {
    pub fn backend(&self) -> StorageBackend {
        match self.database_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.to_string(),
                max_connections: self.max_connections,
            }),
            None => StorageBackend::InMemory,
        }
    }
}
