//! Periodic backup creation and rotation.

use std::sync::Arc;

use casekeep_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backup_ports::{
    BACKUP_FILE_PREFIX, BackupArtifact, BackupCatalog, DumpTool, ENCRYPTED_BACKUP_SUFFIX,
    FileCipher, PLAIN_BACKUP_SUFFIX,
};


/// Maximum number of retained backup artifacts, encrypted or not.
pub const MAX_RETAINED_BACKUPS: usize = 3;

/// Result of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRunOutcome {
    /// File name of the produced artifact.
    pub file_name: String,
    /// Whether the artifact was encrypted.
    pub encrypted: bool,
    /// Size of the plaintext dump in bytes.
    pub size_bytes: u64,
    /// Artifacts pruned by the rotation window, oldest first.
    pub pruned: Vec<String>,
}

/// Service that produces protected database backups and enforces the
/// rotation window.
#[derive(Clone)]
pub struct BackupService {
    catalog: Arc<dyn BackupCatalog>,
    dump_tool: Arc<dyn DumpTool>,
    cipher: Option<Arc<dyn FileCipher>>,
}

impl BackupService {
    /// Creates the service from its ports. Passing no cipher runs backups
    /// in the degraded plaintext mode.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn BackupCatalog>,
        dump_tool: Arc<dyn DumpTool>,
        cipher: Option<Arc<dyn FileCipher>>,
    ) -> Self {
        Self {
            catalog,
            dump_tool,
            cipher,
        }
    }

    /// Lists existing backup artifacts, newest first.
    pub async fn list(&self) -> AppResult<Vec<BackupArtifact>> {
        self.catalog.list().await
    }

    /// Produces one backup artifact: dumps the database, encrypts the dump
    /// when a key is configured, and prunes artifacts beyond the rotation
    /// window.
    pub async fn run_backup(&self, now: DateTime<Utc>) -> AppResult<BackupRunOutcome> {
        let stamp = now.format("%Y%m%d%H%M%S");
        let plain_name = format!("{BACKUP_FILE_PREFIX}{stamp}{PLAIN_BACKUP_SUFFIX}");
        let plain_path = self.catalog.prepare_path(plain_name.as_str()).await?;

        let size_bytes = match self.dump_tool.dump_to(plain_path.as_path()).await {
            Ok(size) => size,
            Err(error) => {
                self.discard(plain_path.as_path()).await;
                return Err(error);
            }
        };

        if size_bytes == 0 {
            self.discard(plain_path.as_path()).await;
            return Err(AppError::ExternalTool(
                "database dump produced an empty file".to_owned(),
            ));
        }

        let (file_name, encrypted) = match self.cipher.as_ref() {
            Some(cipher) => {
                let encrypted_name = format!("{BACKUP_FILE_PREFIX}{stamp}{ENCRYPTED_BACKUP_SUFFIX}");
                let encrypted_path = self.catalog.prepare_path(encrypted_name.as_str()).await?;
                if let Err(error) = cipher
                    .encrypt_file(plain_path.as_path(), encrypted_path.as_path())
                    .await
                {
                    // A failed artifact must not stay behind to be counted
                    // by the rotation window.
                    self.discard(plain_path.as_path()).await;
                    return Err(error);
                }
                (encrypted_name, true)
            }
            None => {
                warn!(
                    file_name = %plain_name,
                    "backup encryption key not configured; storing plaintext dump"
                );
                (plain_name, false)
            }
        };

        let pruned = self.cleanup().await?;

        info!(
            file_name = %file_name,
            encrypted,
            size_bytes,
            pruned = pruned.len(),
            "backup complete"
        );

        Ok(BackupRunOutcome {
            file_name,
            encrypted,
            size_bytes,
            pruned,
        })
    }

    /// Deletes every artifact beyond the most recent
    /// [`MAX_RETAINED_BACKUPS`], independent of encryption format.
    /// Returns the pruned file names.
    pub async fn cleanup(&self) -> AppResult<Vec<String>> {
        let artifacts = self.catalog.list().await?;
        if artifacts.len() <= MAX_RETAINED_BACKUPS {
            return Ok(Vec::new());
        }

        let mut pruned = Vec::new();
        for artifact in artifacts.into_iter().skip(MAX_RETAINED_BACKUPS) {
            self.catalog.remove_file(artifact.path.as_path()).await?;
            info!(file_name = %artifact.file_name, "pruned backup beyond rotation window");
            pruned.push(artifact.file_name);
        }

        Ok(pruned)
    }

    async fn discard(&self, path: &std::path::Path) {
        if let Err(error) = self.catalog.remove_file(path).await {
            warn!(path = %path.display(), error = %error, "failed to remove failed backup file");
        }
    }
}
