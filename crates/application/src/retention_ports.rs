//! Ports and records for the retention and purge use-cases.

use async_trait::async_trait;
use casekeep_core::{AppResult, CaseId};
use casekeep_domain::{Case, RetentionLogAction, RetentionTrigger};
use uuid::Uuid;

/// Input for one cascading purge transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeTransactionInput {
    /// Case to purge.
    pub case_id: CaseId,
    /// What initiated the purge; stored in the retention log.
    pub trigger: RetentionTrigger,
    /// Identity of the actor performing the purge.
    pub performed_by: String,
}

/// Row counts and compensation entries produced by one purge transaction.
///
/// `pending_deletions` lists the document files that were scheduled for
/// physical removal inside the transaction; the service unlinks them only
/// after the transaction has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeTransactionRecord {
    /// Documents soft-deleted inside the transaction.
    pub documents_deleted: u64,
    /// Notification rows hard-deleted inside the transaction.
    pub notifications_deleted: u64,
    /// Audit rows anonymized inside the transaction.
    pub audit_entries_anonymized: u64,
    /// Compensating-log entries for the post-commit file deletions.
    pub pending_deletions: Vec<PendingFileDeletion>,
}

/// One entry of the compensating log for document-file deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFileDeletion {
    /// Identifier of the compensating-log row.
    pub id: Uuid,
    /// Case the file belonged to.
    pub case_id: CaseId,
    /// Identifier of the backing file in document storage.
    pub stored_filename: String,
    /// Number of deletion attempts recorded so far.
    pub attempts: u32,
}

/// Append-only summary of a cleanup run, written to the retention log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionLogEntry {
    /// Kind of run this row summarizes.
    pub action: RetentionLogAction,
    /// Case reference, when the run concerned a single case.
    pub case_id: Option<CaseId>,
    /// Documents soft-deleted by the run.
    pub documents_deleted: u64,
    /// Document files affected by the run.
    pub files_affected: u64,
    /// Notification rows hard-deleted by the run.
    pub notifications_deleted: u64,
    /// Audit rows anonymized by the run.
    pub audit_entries_anonymized: u64,
    /// What initiated the run.
    pub triggered_by: RetentionTrigger,
    /// Identity of the actor performing the run.
    pub performed_by: String,
}

/// Port for case persistence and the transactional purge.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Loads one case by identifier.
    async fn find_case(&self, case_id: CaseId) -> AppResult<Option<Case>>;

    /// Lists every case that has not been soft-deleted.
    async fn list_active_cases(&self) -> AppResult<Vec<Case>>;

    /// Executes every database write of a cascading purge inside one
    /// transaction: soft-deletes the case and its documents, hard-deletes
    /// tag and notification rows, anonymizes audit rows, appends the
    /// retention-log row, and queues the compensating-log entries for the
    /// document files. Rolls everything back on any write failure.
    ///
    /// Returns [`casekeep_core::AppError::NotFound`] when the case does not
    /// exist; in that situation nothing is written.
    async fn purge_case(&self, input: PurgeTransactionInput) -> AppResult<PurgeTransactionRecord>;

    /// Lists outstanding compensating-log entries, oldest first.
    async fn list_pending_file_deletions(
        &self,
        limit: u32,
    ) -> AppResult<Vec<PendingFileDeletion>>;

    /// Removes a compensating-log entry after its file has been deleted.
    async fn resolve_pending_file_deletion(&self, id: Uuid) -> AppResult<()>;

    /// Records a failed deletion attempt on a compensating-log entry.
    async fn record_pending_file_deletion_failure(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// Appends a retention-log row for a run that happened outside the
    /// purge transaction (file-deletion retries).
    async fn append_retention_log(&self, entry: RetentionLogEntry) -> AppResult<()>;
}

/// Port for the document file store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Removes a stored document file.
    ///
    /// Removing a file that is already absent succeeds, so compensating-log
    /// retries stay idempotent.
    async fn remove(&self, stored_filename: &str) -> AppResult<()>;
}
