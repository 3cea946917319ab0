//! Filesystem adapter for the backup artifact catalog.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use casekeep_application::{
    BACKUP_FILE_PREFIX, BackupArtifact, BackupCatalog, ENCRYPTED_BACKUP_SUFFIX,
    PLAIN_BACKUP_SUFFIX,
};
use casekeep_core::{AppError, AppResult};

/// Backup directory catalog.
///
/// Only files carrying the backup prefix and a `.sql`/`.sql.enc` suffix are
/// artifacts; temporary restore files and foreign content are invisible to
/// the rotation window.
#[derive(Debug, Clone)]
pub struct FilesystemBackupCatalog {
    root: PathBuf,
}

impl FilesystemBackupCatalog {
    /// Creates a catalog over `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory this catalog manages.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn contained_path(&self, file_name: &str) -> AppResult<PathBuf> {
        let candidate = Path::new(file_name);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
            || candidate.components().count() != 1
        {
            return Err(AppError::Validation(format!(
                "backup file '{file_name}' escapes the backup directory"
            )));
        }

        Ok(self.root.join(candidate))
    }

    fn is_artifact_name(file_name: &str) -> bool {
        file_name.starts_with(BACKUP_FILE_PREFIX)
            && (file_name.ends_with(ENCRYPTED_BACKUP_SUFFIX)
                || file_name.ends_with(PLAIN_BACKUP_SUFFIX))
    }

    async fn artifact_from_path(&self, file_name: String, path: PathBuf) -> AppResult<BackupArtifact> {
        let metadata = tokio::fs::metadata(path.as_path()).await.map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                AppError::NotFound(format!("backup '{file_name}' not found"))
            } else {
                AppError::Filesystem(format!(
                    "failed to read backup metadata '{}': {error}",
                    path.display()
                ))
            }
        })?;

        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(BackupArtifact {
            encrypted: file_name.ends_with(ENCRYPTED_BACKUP_SUFFIX),
            size_bytes: metadata.len(),
            file_name,
            path,
            modified_at,
        })
    }
}

#[async_trait]
impl BackupCatalog for FilesystemBackupCatalog {
    async fn list(&self) -> AppResult<Vec<BackupArtifact>> {
        let mut entries = match tokio::fs::read_dir(self.root.as_path()).await {
            Ok(entries) => entries,
            // An absent directory simply means no backups exist yet.
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(AppError::Filesystem(format!(
                    "failed to read backup directory '{}': {error}",
                    self.root.display()
                )));
            }
        };

        let mut artifacts = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|error| {
                AppError::Filesystem(format!(
                    "failed to enumerate backup directory '{}': {error}",
                    self.root.display()
                ))
            })?;
            let Some(entry) = entry else {
                break;
            };

            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if !Self::is_artifact_name(file_name.as_str()) {
                continue;
            }

            artifacts
                .push(self.artifact_from_path(file_name, entry.path()).await?);
        }

        // The embedded timestamp sorts correctly as a plain string; newest
        // first.
        artifacts.sort_by(|a, b| b.file_name.cmp(&a.file_name));
        Ok(artifacts)
    }

    async fn resolve(&self, file_name: &str) -> AppResult<BackupArtifact> {
        let path = self.contained_path(file_name)?;
        if !Self::is_artifact_name(file_name) {
            return Err(AppError::Validation(format!(
                "'{file_name}' is not a backup artifact name"
            )));
        }
        self.artifact_from_path(file_name.to_owned(), path).await
    }

    async fn prepare_path(&self, file_name: &str) -> AppResult<PathBuf> {
        let path = self.contained_path(file_name)?;
        tokio::fs::create_dir_all(self.root.as_path())
            .await
            .map_err(|error| {
                AppError::Filesystem(format!(
                    "failed to create backup directory '{}': {error}",
                    self.root.display()
                ))
            })?;
        Ok(path)
    }

    async fn remove_file(&self, path: &Path) -> AppResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AppError::Filesystem(format!(
                "failed to remove backup file '{}': {error}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use casekeep_application::BackupCatalog;
    use casekeep_core::{AppError, AppResult};

    use super::FilesystemBackupCatalog;

    fn io_err(error: std::io::Error) -> AppError {
        AppError::Filesystem(error.to_string())
    }

    #[tokio::test]
    async fn list_filters_and_sorts_newest_first() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        for name in [
            "casekeep_backup_20250101120000.sql",
            "casekeep_backup_20250103120000.sql.enc",
            "casekeep_backup_20250102120000.sql",
            // Not artifacts: a restore temp file and foreign content.
            "casekeep_backup_20250103120000.sql.restore-tmp",
            "notes.txt",
        ] {
            tokio::fs::write(dir.path().join(name), b"dump")
                .await
                .map_err(io_err)?;
        }

        let catalog = FilesystemBackupCatalog::new(dir.path());
        let artifacts = catalog.list().await?;

        let names: Vec<&str> = artifacts
            .iter()
            .map(|artifact| artifact.file_name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "casekeep_backup_20250103120000.sql.enc",
                "casekeep_backup_20250102120000.sql",
                "casekeep_backup_20250101120000.sql",
            ]
        );
        assert!(artifacts[0].encrypted);
        assert!(!artifacts[1].encrypted);
        Ok(())
    }

    #[tokio::test]
    async fn list_of_missing_directory_is_empty() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        let catalog = FilesystemBackupCatalog::new(dir.path().join("never-created"));
        let artifacts = catalog.list().await?;
        assert!(artifacts.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn resolve_rejects_traversal_before_touching_the_filesystem() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        let catalog = FilesystemBackupCatalog::new(dir.path());

        for name in ["../../etc/passwd", "/etc/passwd", "nested/escape.sql"] {
            let result = catalog.resolve(name).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{name}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn resolve_missing_artifact_is_not_found() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        let catalog = FilesystemBackupCatalog::new(dir.path());

        let result = catalog.resolve("casekeep_backup_20250101120000.sql").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn prepare_path_creates_the_backup_directory() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        let root = dir.path().join("backups");
        let catalog = FilesystemBackupCatalog::new(root.as_path());

        let path = catalog
            .prepare_path("casekeep_backup_20250101120000.sql")
            .await?;
        assert!(root.is_dir());
        assert!(path.starts_with(root.as_path()));
        Ok(())
    }

    #[tokio::test]
    async fn remove_file_is_idempotent() -> AppResult<()> {
        let dir = tempfile::tempdir().map_err(io_err)?;
        let catalog = FilesystemBackupCatalog::new(dir.path());
        let path = dir.path().join("casekeep_backup_20250101120000.sql");
        tokio::fs::write(path.as_path(), b"dump")
            .await
            .map_err(io_err)?;

        catalog.remove_file(path.as_path()).await?;
        assert!(!path.exists());
        catalog.remove_file(path.as_path()).await
    }
}
