//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig      # Host, port, shutdown
//! ├── recovery: RecoveryConfig  # Request timeout
//! ├── service: ServiceConfig    # Archive root, chunking, archiver
//! └── logging: LoggingConfig    # --nologs, ENABLE_LOGGING
//! ```
//!
//! All configuration can be provided via CLI arguments or environment
//! variables; arguments win when both are given.
//!
//! # Example
//!
//! ```bash
//! zipstream --dir /srv/photos --chunk-size 65536 --unstable
//!
//! PHOTOS_PARENT_DIR=/srv/photos IMITATE_UNSTABLE_CONNECTION=1 zipstream
//! ```

mod logging;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
pub use logging::LoggingConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use zipstream_server::middleware::RecoveryConfig;
use zipstream_server::service::ServiceConfig;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "zipstream")]
#[command(about = "Streams ZIP archives of photo directories over HTTP")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// Request timeout and panic recovery.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,

    /// Archive streaming configuration.
    #[clap(flatten)]
    pub service: ServiceConfig,

    /// Log verbosity switches.
    #[clap(flatten)]
    pub logging: LoggingConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so clap's `env` fallbacks can see it.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.service
            .validate()
            .context("invalid service configuration")?;
        Ok(())
    }

    /// Logs configuration at info level.
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            "recovery configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            archive_root = %self.service.archive_root.display(),
            chunk_size = self.service.chunk_size,
            unstable = self.service.imitate_unstable_connection,
            jitter_max_secs = self.service.jitter_max_secs,
            zip_program = %self.service.zip_program.display(),
            archive_mode = %self.service.archive_mode,
            index_page = %self.service.index_page.display(),
            "archive configuration"
        );
    }

    /// Logs build information.
    fn log_build_info() {
        tracing::info!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            "starting zipstream server"
        );

        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
