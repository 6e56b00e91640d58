// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # test-genie
//!
//! Server and operator CLI for the agent coordinator.
//!
//! ## Commands
//!
//! - `test-genie serve` - Run the HTTP API and supervise agents
//! - `test-genie config show|validate` - Inspect the effective configuration
//! - `test-genie migrate` - Apply PostgreSQL schema migrations

use anyhow::Result;
use clap::{Parser, Subcommand};

use test_genie::commands::{self, ConfigCommand, MigrateArgs, ServeArgs};
use test_genie::logging::init_logging;

/// test-genie - coordinate concurrent code-modification agents
#[derive(Parser)]
#[command(name = "test-genie")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TEST_GENIE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (compact, json)
    #[arg(long, global = true, env = "TEST_GENIE_LOG_FORMAT", default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator HTTP server
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate(MigrateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; everything also comes from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Config { command } => commands::config::handle_command(command).await,
        Commands::Migrate(args) => commands::migrate::run(args).await,
    }
}
