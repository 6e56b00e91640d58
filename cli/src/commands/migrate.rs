// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `test-genie migrate`: apply the embedded schema migrations.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use test_genie_core::domain::repository::StorageBackend;
use test_genie_core::infrastructure::db::Database;

use super::StorageArgs;

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub storage: StorageArgs,
}

pub async fn run(args: MigrateArgs) -> Result<()> {
    let config = match args.storage.backend() {
        StorageBackend::PostgreSQL(config) => config,
        StorageBackend::InMemory => bail!("DATABASE_URL (or --database-url) is required to run migrations"),
    };

    println!("Applying migrations...");
    let db = Database::new(&config).await.context("Failed to connect to database")?;
    db.migrate().await?;
    println!("{}", "✓ Migrations applied".green());

    Ok(())
}
