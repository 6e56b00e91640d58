// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `test-genie serve`: wire the coordinator and run the HTTP API until a
//! shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use test_genie_core::application::repository_factory::create_coordination_repository;
use test_genie_core::application::{CoordinatorService, HostSeams, SpawnService};
use test_genie_core::domain::config::CoordinatorConfig;
use test_genie_core::domain::security::SecurityValidator;
use test_genie_core::infrastructure::{DefaultSafetyValidator, NoopContainment, ProviderSelector};
use test_genie_core::presentation::{app, AppState};

use super::StorageArgs;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// HTTP API host
    #[arg(long, env = "TEST_GENIE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP API port
    #[arg(long, env = "TEST_GENIE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Skip schema migrations on startup
    #[arg(long)]
    pub skip_migrations: bool,

    #[command(flatten)]
    pub storage: StorageArgs,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let seams = HostSeams::system();
    let config = CoordinatorConfig::load(seams.env.as_ref());
    for warning in config.validate_with_report() {
        warn!("Configuration: {}", warning);
    }

    let repo = create_coordination_repository(&args.storage.backend(), Arc::clone(&seams.clock), !args.skip_migrations)
        .await
        .context("Failed to initialize coordination store")?;

    let coordinator = Arc::new(CoordinatorService::new(repo, config.clone(), seams));
    let report = coordinator.start().await;
    info!(
        checked = report.checked,
        alive = report.alive,
        orphaned = report.orphaned.len(),
        hostname = %coordinator.hostname(),
        "Coordinator started"
    );

    let safety = DefaultSafetyValidator::new().context("Failed to compile safety rules")?;
    let spawn = Arc::new(SpawnService::new(
        Arc::clone(&coordinator),
        ProviderSelector::claude(config.cli_binary.as_deref()),
        SecurityValidator::new(Arc::new(safety)),
        Arc::new(NoopContainment),
    ));

    let router = app(Arc::new(AppState::new(spawn)));
    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("test-genie listening on http://{}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Stopping owned agents");
    coordinator.shutdown().await;
    info!("test-genie shut down");

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
