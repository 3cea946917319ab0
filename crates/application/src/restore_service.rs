//! Restore from a backup artifact into a recreated database.

use std::path::Path;
use std::sync::Arc;

use casekeep_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backup_ports::{BackupCatalog, DumpTool, ENCRYPTED_BACKUP_SUFFIX, FileCipher};


/// Suffix of the temporary decrypted dump. Deliberately not a catalog
/// artifact suffix, so the temporary file never shows up in listings or
/// the rotation window.
const RESTORE_TEMP_SUFFIX: &str = ".restore-tmp";

/// Result of one completed restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Artifact the database was restored from.
    pub backup_file: String,
    /// Whether the artifact had to be decrypted first.
    pub decrypted: bool,
    /// When the restore finished.
    pub completed_at: DateTime<Utc>,
}

/// Service that restores the database from a backup artifact.
///
/// The requested path is validated against the backup directory before any
/// destructive action; dropping the database is the point of no return.
#[derive(Clone)]
pub struct RestoreService {
    catalog: Arc<dyn BackupCatalog>,
    dump_tool: Arc<dyn DumpTool>,
    cipher: Option<Arc<dyn FileCipher>>,
}

impl RestoreService {
    /// Creates the service from its ports.
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

    /// Restores the database from `target`, or from the most recent
    /// artifact when no target is given.
    pub async fn restore(&self, target: Option<&str>) -> AppResult<RestoreOutcome> {
        let artifact = match target {
            Some(file_name) => self.catalog.resolve(file_name).await?,
            None => self
                .catalog
                .list()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::NotFound("no backup artifacts available to restore".to_owned())
                })?,
        };

        let (dump_path, decrypted) = if artifact.encrypted {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                AppError::Configuration(
                    "backup artifact is encrypted but no encryption key is configured".to_owned(),
                )
            })?;

            let base = artifact
                .file_name
                .strip_suffix(ENCRYPTED_BACKUP_SUFFIX)
                .unwrap_or(artifact.file_name.as_str());
            let temp_name = format!("{base}{RESTORE_TEMP_SUFFIX}");
            let temp_path = self.catalog.prepare_path(temp_name.as_str()).await?;
            cipher
                .decrypt_file(artifact.path.as_path(), temp_path.as_path())
                .await?;
            (temp_path, true)
        } else {
            (artifact.path.clone(), false)
        };

        let result = self.recreate_and_load(dump_path.as_path()).await;

        if decrypted {
            // The plaintext dump must not outlive the restore, on success
            // or on failure.
            if let Err(error) = self.catalog.remove_file(dump_path.as_path()).await {
                warn!(
                    path = %dump_path.display(),
                    error = %error,
                    "failed to remove temporary decrypted dump"
                );
            }
        }

        result?;

        let completed_at = Utc::now();
        info!(
            backup_file = %artifact.file_name,
            decrypted,
            "database restored from backup"
        );

        Ok(RestoreOutcome {
            backup_file: artifact.file_name,
            decrypted,
            completed_at,
        })
    }

    async fn recreate_and_load(&self, dump: &Path) -> AppResult<()> {
        self.dump_tool.recreate_database().await?;
        self.dump_tool.restore_from(dump).await
    }
}
