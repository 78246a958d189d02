//! Static index page.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::{Error, Result};

/// HTML document served on the root route.
///
/// The file is read on every request so it can be edited without a restart.
#[derive(Debug, Clone)]
pub struct IndexPage {
    path: Arc<Path>,
}

impl IndexPage {
    /// Creates a page backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::from(path.into()),
        }
    }

    /// Returns the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the page contents.
    pub async fn load(&self) -> Result<String> {
        fs::read_to_string(&self.path).await.map_err(|err| {
            Error::file_system(format!(
                "failed to read index page {}",
                self.path.display()
            ))
            .with_source(err)
        })
    }
}
