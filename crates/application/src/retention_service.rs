//! Cascading purge and the scheduled retention sweep.

use std::sync::Arc;

use casekeep_core::{AppError, AppResult, CaseId};
use casekeep_domain::{RetentionLogAction, RetentionTrigger};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::retention_ports::{
    CaseRepository, DocumentStore, PurgeTransactionInput, RetentionLogEntry,
};

#[cfg(test)]
mod tests;

/// Actor identity recorded for runs initiated by the scheduler.
pub const SYSTEM_ACTOR: &str = "system";

/// Upper bound of compensating-log entries retried per sweep.
const PENDING_RETRY_BATCH: u32 = 200;

/// One failed document-file deletion within a purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDeletionError {
    /// Identifier of the file that could not be removed.
    pub stored_filename: String,
    /// Why the removal failed.
    pub reason: String,
}

/// Result of one cascading purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Case that was purged.
    pub case_id: CaseId,
    /// Documents soft-deleted.
    pub documents_deleted: u64,
    /// Document files physically removed after commit.
    pub files_deleted: u64,
    /// File removals that failed; they stay queued for retry.
    pub file_errors: Vec<FileDeletionError>,
    /// Notification rows hard-deleted.
    pub notifications_deleted: u64,
    /// Audit rows anonymized.
    pub audit_entries_anonymized: u64,
}

/// One case that could not be purged during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepError {
    /// Case the failure concerns.
    pub case_id: CaseId,
    /// Rendered failure reason.
    pub error: String,
}

/// Aggregated result of one retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Cases examined for eligibility.
    pub total_checked: u64,
    /// Cases successfully purged.
    pub purged: Vec<PurgeOutcome>,
    /// Per-case failures; they never abort the remaining batch.
    pub errors: Vec<SweepError>,
    /// Files drained from the compensating log at the end of the sweep.
    pub retried_file_deletions: u64,
}

/// Service that enforces retention policies against the system of record.
///
/// Database writes of a purge are atomic; document-file removal happens
/// strictly after commit, driven by the compensating log, so a rollback can
/// never leave a record pointing at an already-removed file.
#[derive(Clone)]
pub struct RetentionService {
    case_repository: Arc<dyn CaseRepository>,
    document_store: Arc<dyn DocumentStore>,
}

impl RetentionService {
    /// Creates the service from its ports.
    #[must_use]
    pub fn new(
        case_repository: Arc<dyn CaseRepository>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            case_repository,
            document_store,
        }
    }

    /// Purges one case and all of its dependents.
    ///
    /// Eligibility is the caller's contract: this function does not
    /// re-verify `legal_hold` or the retention deadline. The sweep filters
    /// through [`casekeep_domain::Case::is_eligible_for_purge`] first, and
    /// administrative purges are deliberate.
    pub async fn purge_case(
        &self,
        case_id: CaseId,
        trigger: RetentionTrigger,
        performed_by: &str,
    ) -> AppResult<PurgeOutcome> {
        let case = self
            .case_repository
            .find_case(case_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("case '{case_id}' not found")))?;

        let record = self
            .case_repository
            .purge_case(PurgeTransactionInput {
                case_id,
                trigger,
                performed_by: performed_by.to_owned(),
            })
            .await?;

        let mut files_deleted = 0_u64;
        let mut file_errors = Vec::new();
        for pending in &record.pending_deletions {
            match self.document_store.remove(pending.stored_filename.as_str()).await {
                Ok(()) => {
                    files_deleted += 1;
                    if let Err(error) = self
                        .case_repository
                        .resolve_pending_file_deletion(pending.id)
                        .await
                    {
                        warn!(
                            case_id = %case_id,
                            stored_filename = %pending.stored_filename,
                            error = %error,
                            "file removed but compensating-log entry could not be resolved"
                        );
                    }
                }
                Err(error) => {
                    let reason = error.to_string();
                    warn!(
                        case_id = %case_id,
                        stored_filename = %pending.stored_filename,
                        error = %reason,
                        "document file removal failed; entry stays queued for retry"
                    );
                    if let Err(record_error) = self
                        .case_repository
                        .record_pending_file_deletion_failure(pending.id, reason.as_str())
                        .await
                    {
                        warn!(
                            case_id = %case_id,
                            error = %record_error,
                            "failed to record file-deletion failure"
                        );
                    }
                    file_errors.push(FileDeletionError {
                        stored_filename: pending.stored_filename.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            case_id = %case_id,
            retention_policy = case.retention_policy.as_str(),
            trigger = trigger.as_str(),
            documents_deleted = record.documents_deleted,
            files_deleted,
            file_errors = file_errors.len(),
            notifications_deleted = record.notifications_deleted,
            audit_entries_anonymized = record.audit_entries_anonymized,
            "case purged"
        );

        Ok(PurgeOutcome {
            case_id,
            documents_deleted: record.documents_deleted,
            files_deleted,
            file_errors,
            notifications_deleted: record.notifications_deleted,
            audit_entries_anonymized: record.audit_entries_anonymized,
        })
    }

    /// Runs one retention sweep: purges every eligible case, then retries
    /// outstanding file deletions from the compensating log.
    ///
    /// One case's failure never stops the remaining batch; partial success
    /// is the designed outcome.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cases = self.case_repository.list_active_cases().await?;
        let total_checked = cases.len() as u64;

        let mut purged = Vec::new();
        let mut errors = Vec::new();
        for case in cases
            .into_iter()
            .filter(|case| case.is_eligible_for_purge(now))
        {
            match self
                .purge_case(case.id, RetentionTrigger::AutoRetention, SYSTEM_ACTOR)
                .await
            {
                Ok(outcome) => purged.push(outcome),
                Err(error) => {
                    warn!(case_id = %case.id, error = %error, "sweep failed to purge case");
                    errors.push(SweepError {
                        case_id: case.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        let retried_file_deletions = match self
            .retry_pending_file_deletions(PENDING_RETRY_BATCH)
            .await
        {
            Ok(count) => count,
            Err(error) => {
                warn!(error = %error, "failed to retry pending file deletions");
                0
            }
        };

        info!(
            total_checked,
            purged = purged.len(),
            errors = errors.len(),
            retried_file_deletions,
            "retention sweep complete"
        );

        Ok(SweepReport {
            total_checked,
            purged,
            errors,
            retried_file_deletions,
        })
    }

    /// Drains up to `limit` entries from the compensating log, removing the
    /// backing files whose deletion failed in earlier runs.
    pub async fn retry_pending_file_deletions(&self, limit: u32) -> AppResult<u64> {
        let pending = self
            .case_repository
            .list_pending_file_deletions(limit)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut files_deleted = 0_u64;
        for entry in &pending {
            match self.document_store.remove(entry.stored_filename.as_str()).await {
                Ok(()) => {
                    files_deleted += 1;
                    self.case_repository
                        .resolve_pending_file_deletion(entry.id)
                        .await?;
                }
                Err(error) => {
                    warn!(
                        stored_filename = %entry.stored_filename,
                        attempts = entry.attempts + 1,
                        error = %error,
                        "retried file deletion failed"
                    );
                    self.case_repository
                        .record_pending_file_deletion_failure(entry.id, error.to_string().as_str())
                        .await?;
                }
            }
        }

        if files_deleted > 0 {
            self.case_repository
                .append_retention_log(RetentionLogEntry {
                    action: RetentionLogAction::PendingFilesRetried,
                    case_id: None,
                    documents_deleted: 0,
                    files_affected: files_deleted,
                    notifications_deleted: 0,
                    audit_entries_anonymized: 0,
                    triggered_by: RetentionTrigger::AutoRetention,
                    performed_by: SYSTEM_ACTOR.to_owned(),
                })
                .await?;
        }

        Ok(files_deleted)
    }
}
