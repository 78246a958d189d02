use std::path::PathBuf;

#[cfg(feature = "config")]
use clap::Args;
#[cfg(feature = "config")]
use clap::builder::BoolishValueParser;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::service::{
    ArchiveCommand, ArchiveMode, ArchiveService, DEFAULT_ARCHIVER, DEFAULT_CHUNK_SIZE,
    DEFAULT_JITTER_MAX_SECS, IndexPage, RandomJitter,
};
use crate::{Error, Result};

/// Default values for configuration options.
mod defaults {
    /// Default parent directory of the archivable directories.
    pub const ARCHIVE_ROOT: &str = "photos";

    /// Default path to the index page.
    pub const INDEX_PAGE: &str = "index.html";

    /// Largest accepted chunk size (64 MiB).
    pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;
}

/// App [`state`] configuration.
///
/// Read once at startup and never mutated afterwards.
///
/// [`state`]: crate::service::ServiceState
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct ServiceConfig {
    /// Parent directory holding one subdirectory per archive.
    #[cfg_attr(
        feature = "config",
        arg(short = 'd', long = "dir", env = "PHOTOS_PARENT_DIR", default_value = defaults::ARCHIVE_ROOT)
    )]
    #[builder(default = "defaults::ARCHIVE_ROOT.into()")]
    pub archive_root: PathBuf,

    /// Number of bytes read from the archiver per chunk.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)
    )]
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Pauses randomly after every chunk to imitate an unstable connection.
    #[cfg_attr(
        feature = "config",
        arg(
            short = 'u',
            long = "unstable",
            env = "IMITATE_UNSTABLE_CONNECTION",
            value_parser = BoolishValueParser::new()
        )
    )]
    #[builder(default)]
    #[serde(default)]
    pub imitate_unstable_connection: bool,

    /// Upper bound in seconds of the pause used by `--unstable`.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "JITTER_MAX_SECS", default_value_t = DEFAULT_JITTER_MAX_SECS)
    )]
    #[builder(default = "DEFAULT_JITTER_MAX_SECS")]
    pub jitter_max_secs: u64,

    /// Archiver executable; must accept `zip` arguments.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "ZIP_PROGRAM", default_value = DEFAULT_ARCHIVER)
    )]
    #[builder(default = "DEFAULT_ARCHIVER.into()")]
    pub zip_program: PathBuf,

    /// Whether archive members keep the directory name as prefix.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "ARCHIVE_MODE", value_enum, default_value_t = ArchiveMode::Flatten)
    )]
    #[builder(default)]
    #[serde(default)]
    pub archive_mode: ArchiveMode,

    /// HTML document served on `/`.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "INDEX_PAGE", default_value = defaults::INDEX_PAGE)
    )]
    #[builder(default = "defaults::INDEX_PAGE.into()")]
    pub index_page: PathBuf,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validates configuration values that clap cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        check_chunk_size(self.chunk_size).map_err(Error::config)
    }

    /// Returns the archiver binding described by this configuration.
    pub fn archive_command(&self) -> ArchiveCommand {
        ArchiveCommand::new(&self.zip_program).with_mode(self.archive_mode)
    }

    /// Creates the archive service.
    pub fn create_archive_service(&self) -> Result<ArchiveService> {
        self.validate()?;

        let service = ArchiveService::new(&self.archive_root, self.chunk_size)
            .with_command(self.archive_command());

        if self.imitate_unstable_connection {
            Ok(service.with_delay(RandomJitter::new(self.jitter_max_secs)))
        } else {
            Ok(service)
        }
    }

    /// Creates the index page service.
    pub fn create_index_page(&self) -> IndexPage {
        IndexPage::new(&self.index_page)
    }
}

impl ServiceConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.chunk_size {
            Some(chunk_size) => check_chunk_size(chunk_size),
            None => Ok(()),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            archive_root: defaults::ARCHIVE_ROOT.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            imitate_unstable_connection: false,
            jitter_max_secs: DEFAULT_JITTER_MAX_SECS,
            zip_program: DEFAULT_ARCHIVER.into(),
            archive_mode: ArchiveMode::default(),
            index_page: defaults::INDEX_PAGE.into(),
        }
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<(), String> {
    if chunk_size == 0 || chunk_size > defaults::MAX_CHUNK_SIZE {
        return Err(format!(
            "Chunk size {chunk_size} is invalid. Must be between 1 and {} bytes.",
            defaults::MAX_CHUNK_SIZE
        ));
    }

    Ok(())
}
