// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the coordination repository for the configured storage backend.
//! The domain layer only knows the traits; this is the one place that picks
//! a concrete implementation.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire a `CoordinationRepository` from a `StorageBackend`

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::domain::host::Clock;
use crate::domain::repository::{CoordinationRepository, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InMemoryCoordinationRepository, PostgresCoordinationRepository};

/// Connects (and optionally migrates) the store selected by `backend`.
pub async fn create_coordination_repository(
    backend: &StorageBackend,
    clock: Arc<dyn Clock>,
    run_migrations: bool,
) -> Result<Arc<dyn CoordinationRepository>> {
    match backend {
        StorageBackend::InMemory => {
            info!("Using in-memory coordination store; state is lost on restart");
            Ok(Arc::new(InMemoryCoordinationRepository::with_clock(clock)))
        }
        StorageBackend::PostgreSQL(config) => {
            let db = Database::new(config).await?;
            if run_migrations {
                db.migrate().await?;
            }
            info!(max_connections = config.max_connections, "Connected to PostgreSQL coordination store");
            Ok(Arc::new(PostgresCoordinationRepository::new(db.get_pool().clone())))
        }
    }
}
