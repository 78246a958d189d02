//! Log verbosity configuration and tracing initialization.

use anyhow::anyhow;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when logging is enabled and `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Filter used when logging is disabled; errors are always reported.
const QUIET_FILTER: &str = "error";

/// Log verbosity switches.
///
/// `RUST_LOG` takes precedence over both switches when set.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
#[must_use = "config does nothing unless you use it"]
pub struct LoggingConfig {
    /// Only log errors.
    #[arg(short = 'n', long = "nologs")]
    #[serde(default)]
    pub nologs: bool,

    /// Enables informational logging; `--nologs` wins over this.
    #[arg(
        long,
        env = "ENABLE_LOGGING",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_logging: bool,
}

impl LoggingConfig {
    /// Returns whether informational logging is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enable_logging && !self.nologs
    }

    /// Returns the filter directive applied when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_filter(&self) -> &'static str {
        if self.is_enabled() {
            DEFAULT_FILTER
        } else {
            QUIET_FILTER
        }
    }

    /// Initializes the global tracing subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_filter()));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init()
            .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            nologs: false,
            enable_logging: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_is_enabled_by_default() {
        let config = LoggingConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.default_filter(), "info");
    }

    #[test]
    fn nologs_wins_over_enable_logging() {
        let config = LoggingConfig {
            nologs: true,
            enable_logging: true,
        };
        assert!(!config.is_enabled());
        assert_eq!(config.default_filter(), "error");
    }

    #[test]
    fn disabled_logging_keeps_errors() {
        let config = LoggingConfig {
            nologs: false,
            enable_logging: false,
        };
        assert_eq!(config.default_filter(), "error");
    }
}
