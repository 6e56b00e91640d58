// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tracing subscriber setup

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format.trim().to_ascii_lowercase().as_str() {
        "json" => builder.json().with_current_span(false).init(),
        "compact" | "" => builder.with_target(false).compact().init(),
        other => bail!("Unknown log format '{other}' (expected compact or json)"),
    }

    Ok(())
}
