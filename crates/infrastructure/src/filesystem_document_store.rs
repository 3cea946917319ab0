//! Filesystem adapter for the document file store.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use casekeep_application::DocumentStore;
use casekeep_core::{AppError, AppResult};

/// Document storage rooted at the platform's upload directory.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentStore {
    root: PathBuf,
}

impl FilesystemDocumentStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn contained_path(&self, stored_filename: &str) -> AppResult<PathBuf> {
        let candidate = Path::new(stored_filename);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(AppError::Validation(format!(
                "stored filename '{stored_filename}' escapes the upload directory"
            )));
        }

        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl DocumentStore for FilesystemDocumentStore {
    async fn remove(&self, stored_filename: &str) -> AppResult<()> {
        let path = self.contained_path(stored_filename)?;
        match tokio::fs::remove_file(path.as_path()).await {
            Ok(()) => Ok(()),
            // Already absent counts as removed; compensating-log retries
            // must stay idempotent.
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AppError::Filesystem(format!(
                "failed to remove document file '{}': {error}",
                path.display()
            ))),
        }
    }
}
