// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;

use test_genie_core::domain::config::{CoordinatorConfig, ENV_PREFIX};
use test_genie_core::infrastructure::OsEnvironment;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration after clamping and self-correction
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report risky settings; exits non-zero when any are found with --strict
    Validate {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

pub async fn handle_command(command: ConfigCommand) -> Result<()> {
    let config = CoordinatorConfig::load(&OsEnvironment);
    match command {
        ConfigCommand::Show { json } => show(&config, json),
        ConfigCommand::Validate { strict } => validate(&config, strict),
    }
}

fn show(config: &CoordinatorConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!("  (override any value with {}<NAME>)", ENV_PREFIX);
    println!();

    println!("{}", "Locking:".bold());
    println!("  Lock timeout: {}m", config.lock_timeout_minutes);
    println!("  Heartbeat interval: {}m", config.heartbeat_interval_minutes);
    println!("  Max heartbeat failures: {}", config.max_heartbeat_failures);
    println!("  Store timeout: {}s", config.store_timeout_seconds);
    println!();

    println!("{}", "Execution defaults:".bold());
    println!("  Timeout: {}s", config.default_timeout_seconds);
    println!("  Max turns: {}", config.default_max_turns);
    println!("  Max files: {}", config.default_max_files);
    println!("  Max bytes: {}", config.default_max_bytes);
    println!("  Network enabled: {}", config.default_network_enabled);
    println!();

    println!("{}", "Retention:".bold());
    println!("  Retention: {}d", config.retention_days);
    println!("  Cleanup interval: {}m", config.cleanup_interval_minutes);
    println!("  Idempotency TTL: {}m", config.idempotency_ttl_minutes);
    println!("  Spawn session TTL: {}m", config.spawn_session_ttl_minutes);
    println!();

    println!("{}", "Spawn limits:".bold());
    println!("  Max prompts per spawn: {}", config.max_prompts_per_spawn);
    println!("  Max concurrent agents: {}", config.max_concurrent_agents);
    println!("  Default concurrency: {}", config.default_concurrency);
    println!();

    println!("{}", "Paths:".bold());
    println!("  Scenarios: {}", config.scenarios_root().display());
    println!("  API endpoint: {}", config.api_endpoint);
    println!(
        "  Agent CLI: {}",
        config.cli_binary.as_deref().unwrap_or("claude (PATH)").dimmed()
    );

    Ok(())
}

fn validate(config: &CoordinatorConfig, strict: bool) -> Result<()> {
    println!("Validating configuration...");

    let warnings = config.validate_with_report();
    if warnings.is_empty() {
        println!("{}", "✓ Configuration is valid".green());
        return Ok(());
    }

    for warning in &warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    if strict {
        bail!("{} configuration warning(s)", warnings.len());
    }
    println!("{}", format!("✓ Configuration is usable ({} warning(s))", warnings.len()).yellow());

    Ok(())
}
