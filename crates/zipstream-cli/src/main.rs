#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;

use anyhow::Context;
use axum::Router;
use zipstream_server::handler::routes;
use zipstream_server::middleware::{RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt};
use zipstream_server::service::ServiceState;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "zipstream_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "zipstream_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "zipstream_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    cli.logging.init_tracing()?;
    cli.log();
    cli.validate()?;

    let state =
        ServiceState::from_config(&cli.service).context("failed to create service state")?;
    let archive_service = state.archive_service().clone();
    let router = create_router(state, &cli.recovery);

    server::serve(router, cli.server, archive_service).await?;

    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Recovery (outermost) - catches panics and enforces timeouts
/// 2. Observability - request IDs and tracing spans
/// 3. Routes (innermost) - actual request handlers
fn create_router(state: ServiceState, recovery: &RecoveryConfig) -> Router {
    routes()
        .with_state(state)
        .with_observability()
        .with_recovery(recovery)
}
