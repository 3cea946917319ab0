//! Ports and records for the backup and restore use-cases.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casekeep_core::AppResult;
use chrono::{DateTime, Utc};

/// Prefix shared by every backup artifact file name.
pub const BACKUP_FILE_PREFIX: &str = "casekeep_backup_";

/// Suffix of a plaintext SQL dump artifact.
pub const PLAIN_BACKUP_SUFFIX: &str = ".sql";

/// Suffix of an encrypted dump artifact.
pub const ENCRYPTED_BACKUP_SUFFIX: &str = ".sql.enc";

/// One on-disk backup artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// File name within the backup directory. The embedded timestamp is
    /// formatted so that a plain string sort orders artifacts by age.
    pub file_name: String,
    /// Absolute or directory-relative path of the artifact.
    pub path: PathBuf,
    /// Artifact size in bytes.
    pub size_bytes: u64,
    /// Whether the artifact carries the encrypted-format suffix.
    pub encrypted: bool,
    /// Last-modification time of the file.
    pub modified_at: DateTime<Utc>,
}

/// Port over the backup directory.
#[async_trait]
pub trait BackupCatalog: Send + Sync {
    /// Lists backup artifacts, newest first by embedded timestamp.
    async fn list(&self) -> AppResult<Vec<BackupArtifact>>;

    /// Resolves a requested artifact by file name.
    ///
    /// Rejects with [`casekeep_core::AppError::Validation`] any name that
    /// lexically escapes the backup directory, before touching the
    /// filesystem.
    async fn resolve(&self, file_name: &str) -> AppResult<BackupArtifact>;

    /// Returns the path a new file with `file_name` should be written to,
    /// creating the backup directory if needed. The same containment rule
    /// as [`BackupCatalog::resolve`] applies.
    async fn prepare_path(&self, file_name: &str) -> AppResult<PathBuf>;

    /// Removes one file from the backup directory.
    async fn remove_file(&self, path: &Path) -> AppResult<()>;
}

/// Port over the external database dump/restore utility.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Runs the dump utility, writing a plaintext SQL dump to `out`.
    /// Returns the size of the written dump in bytes.
    async fn dump_to(&self, out: &Path) -> AppResult<u64>;

    /// Drops and recreates the target database. Irreversible.
    async fn recreate_database(&self) -> AppResult<()>;

    /// Loads a plaintext SQL dump into the target database.
    async fn restore_from(&self, dump: &Path) -> AppResult<()>;
}

/// Port over authenticated file encryption.
#[async_trait]
pub trait FileCipher: Send + Sync {
    /// Encrypts `plain` into `out`; removes `plain` only once `out` is
    /// durably written. On failure the partial output is removed.
    async fn encrypt_file(&self, plain: &Path, out: &Path) -> AppResult<()>;

    /// Decrypts `enc` into `out`, verifying the authentication tag.
    /// Verification failure removes the partial output and yields
    /// [`casekeep_core::AppError::Integrity`]; truncated or wrong
    /// plaintext is never returned silently.
    async fn decrypt_file(&self, enc: &Path, out: &Path) -> AppResult<()>;
}
