//! Application services and ports.

#![forbid(unsafe_code)]

mod backup_ports;
mod backup_service;
mod restore_service;
mod retention_ports;
mod retention_service;

pub use backup_ports::{
    BACKUP_FILE_PREFIX, BackupArtifact, BackupCatalog, DumpTool, ENCRYPTED_BACKUP_SUFFIX,
    FileCipher, PLAIN_BACKUP_SUFFIX,
};
pub use backup_service::{BackupRunOutcome, BackupService, MAX_RETAINED_BACKUPS};
pub use restore_service::{RestoreOutcome, RestoreService};
pub use retention_ports::{
    CaseRepository, DocumentStore, PendingFileDeletion, PurgeTransactionInput,
    PurgeTransactionRecord, RetentionLogEntry,
};
pub use retention_service::{
    FileDeletionError, PurgeOutcome, RetentionService, SYSTEM_ACTOR, SweepError, SweepReport,
};
