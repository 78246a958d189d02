//! Application state and dependency injection.

mod archive;
mod config;
mod page;

pub use crate::service::archive::{
    ArchiveCommand, ArchiveMode, ArchiveService, ArchiveStream, ChunkDelay, DEFAULT_ARCHIVER,
    DEFAULT_CHUNK_SIZE, DEFAULT_JITTER_MAX_SECS, NoDelay, RandomJitter, SessionMetrics,
    SessionOutcome, StreamError,
};
pub use crate::service::config::{ServiceConfig, ServiceConfigBuilder};
pub use crate::service::page::IndexPage;
// Re-export error types from crate root for convenience
pub use crate::{Error, Result};

/// Tracing target for service state construction.
const TRACING_TARGET: &str = "zipstream_server::service";

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection). Everything in
/// here is read-only after startup.
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Debug, Clone)]
pub struct ServiceState {
    archive_service: ArchiveService,
    index_page: IndexPage,
}

impl ServiceState {
    /// Creates application state from already constructed services.
    pub fn new(archive_service: ArchiveService, index_page: IndexPage) -> Self {
        Self {
            archive_service,
            index_page,
        }
    }

    /// Initializes application state from configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let archive_service = config.create_archive_service()?;

        if !config.archive_root.is_dir() {
            tracing::warn!(
                target: TRACING_TARGET,
                archive_root = %config.archive_root.display(),
                "archive root is not a directory, every archive request will return 404"
            );
        }

        Ok(Self::new(archive_service, config.create_index_page()))
    }

    /// Returns the archive streaming service.
    #[inline]
    pub fn archive_service(&self) -> &ArchiveService {
        &self.archive_service
    }

    /// Returns the index page service.
    #[inline]
    pub fn index_page(&self) -> &IndexPage {
        &self.index_page
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(archive_service: ArchiveService);
impl_di!(index_page: IndexPage);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_default_config() -> anyhow::Result<()> {
        let state = ServiceState::from_config(&ServiceConfig::default())?;
        assert_eq!(state.archive_service().root(), std::path::Path::new("photos"));
        assert_eq!(state.index_page().path(), std::path::Path::new("index.html"));
        Ok(())
    }
}
