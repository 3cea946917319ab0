use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use casekeep_core::{AppError, AppResult, CaseId, DocumentId};
use casekeep_domain::{Case, Document, RetentionLogAction, RetentionPolicy, RetentionTrigger};

use crate::retention_ports::{
    CaseRepository, DocumentStore, PendingFileDeletion, PurgeTransactionInput,
    PurgeTransactionRecord, RetentionLogEntry,
};

use super::{RetentionService, SYSTEM_ACTOR};

#[derive(Default)]
struct FakeCaseRepository {
    cases: Mutex<Vec<Case>>,
    documents: Mutex<Vec<Document>>,
    notification_counts: Mutex<HashMap<CaseId, u64>>,
    audit_counts: Mutex<HashMap<CaseId, u64>>,
    pending: Mutex<Vec<PendingFileDeletion>>,
    retention_log: Mutex<Vec<RetentionLogEntry>>,
    fail_purge_for: Mutex<HashSet<CaseId>>,
}

#[async_trait]
impl CaseRepository for FakeCaseRepository {
    async fn find_case(&self, case_id: CaseId) -> AppResult<Option<Case>> {
        Ok(self
            .cases
            .lock()
            .await
            .iter()
            .find(|case| case.id == case_id)
            .cloned())
    }

    async fn list_active_cases(&self) -> AppResult<Vec<Case>> {
        Ok(self
            .cases
            .lock()
            .await
            .iter()
            .filter(|case| case.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn purge_case(&self, input: PurgeTransactionInput) -> AppResult<PurgeTransactionRecord> {
        if self.fail_purge_for.lock().await.contains(&input.case_id) {
            return Err(AppError::Internal("simulated transaction failure".to_owned()));
        }

        let mut cases = self.cases.lock().await;
        let Some(case) = cases.iter_mut().find(|case| case.id == input.case_id) else {
            return Err(AppError::NotFound(format!(
                "case '{}' not found",
                input.case_id
            )));
        };

        let now = Utc::now();
        case.deleted_at = Some(now);

        let mut documents = self.documents.lock().await;
        let mut documents_deleted = 0_u64;
        let mut pending_deletions = Vec::new();
        for document in documents
            .iter_mut()
            .filter(|document| document.case_id == input.case_id && document.deleted_at.is_none())
        {
            document.deleted_at = Some(now);
            documents_deleted += 1;
            pending_deletions.push(PendingFileDeletion {
                id: Uuid::new_v4(),
                case_id: input.case_id,
                stored_filename: document.stored_filename.clone(),
                attempts: 0,
            });
        }

        let notifications_deleted = self
            .notification_counts
            .lock()
            .await
            .remove(&input.case_id)
            .unwrap_or(0);
        let audit_entries_anonymized = self
            .audit_counts
            .lock()
            .await
            .get(&input.case_id)
            .copied()
            .unwrap_or(0);

        self.pending
            .lock()
            .await
            .extend(pending_deletions.iter().cloned());
        self.retention_log.lock().await.push(RetentionLogEntry {
            action: RetentionLogAction::CasePurged,
            case_id: Some(input.case_id),
            documents_deleted,
            files_affected: pending_deletions.len() as u64,
            notifications_deleted,
            audit_entries_anonymized,
            triggered_by: input.trigger,
            performed_by: input.performed_by,
        });

        Ok(PurgeTransactionRecord {
            documents_deleted,
            notifications_deleted,
            audit_entries_anonymized,
            pending_deletions,
        })
    }

    async fn list_pending_file_deletions(
        &self,
        limit: u32,
    ) -> AppResult<Vec<PendingFileDeletion>> {
        Ok(self
            .pending
            .lock()
            .await
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn resolve_pending_file_deletion(&self, id: Uuid) -> AppResult<()> {
        self.pending.lock().await.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn record_pending_file_deletion_failure(&self, id: Uuid, _error: &str) -> AppResult<()> {
        if let Some(entry) = self
            .pending
            .lock()
            .await
            .iter_mut()
            .find(|entry| entry.id == id)
        {
            entry.attempts += 1;
        }
        Ok(())
    }

    async fn append_retention_log(&self, entry: RetentionLogEntry) -> AppResult<()> {
        self.retention_log.lock().await.push(entry);
        Ok(())
    }
}

#[derive(Default)]
struct FakeDocumentStore {
    removed: Mutex<Vec<String>>,
    fail_for: Mutex<HashSet<String>>,
}

#[async_trait]
impl DocumentStore for FakeDocumentStore {
    async fn remove(&self, stored_filename: &str) -> AppResult<()> {
        if self.fail_for.lock().await.contains(stored_filename) {
            return Err(AppError::Filesystem(format!(
                "permission denied removing '{stored_filename}'"
            )));
        }
        self.removed.lock().await.push(stored_filename.to_owned());
        Ok(())
    }
}

fn eligible_case(policy: RetentionPolicy) -> Case {
    let now = Utc::now();
    Case {
        id: CaseId::new(),
        title: "Smith v. Jones".to_owned(),
        created_at: now - Duration::days(4000),
        retention_policy: policy,
        retention_date: Some((now - Duration::days(2)).date_naive()),
        legal_hold: false,
        deleted_at: None,
    }
}

fn document_for(case_id: CaseId, stored_filename: &str) -> Document {
    Document {
        id: DocumentId::new(),
        case_id,
        stored_filename: stored_filename.to_owned(),
        deleted_at: None,
    }
}

fn service(
    repository: Arc<FakeCaseRepository>,
    store: Arc<FakeDocumentStore>,
) -> RetentionService {
    RetentionService::new(repository, store)
}

#[tokio::test]
async fn sweep_purges_eligible_case_with_auto_retention_trigger() -> AppResult<()> {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let case = eligible_case(RetentionPolicy::SevenYears);
    let case_id = case.id;
    repository.cases.lock().await.push(case);
    repository
        .documents
        .lock()
        .await
        .push(document_for(case_id, "exhibits/contract.pdf"));
    repository.notification_counts.lock().await.insert(case_id, 2);
    repository.audit_counts.lock().await.insert(case_id, 5);

    let report = service(repository.clone(), store.clone())
        .sweep(Utc::now())
        .await?;

    assert_eq!(report.total_checked, 1);
    assert_eq!(report.errors.len(), 0);
    assert_eq!(report.purged.len(), 1);
    let outcome = &report.purged[0];
    assert_eq!(outcome.case_id, case_id);
    assert_eq!(outcome.documents_deleted, 1);
    assert_eq!(outcome.files_deleted, 1);
    assert_eq!(outcome.notifications_deleted, 2);
    assert_eq!(outcome.audit_entries_anonymized, 5);
    assert!(outcome.file_errors.is_empty());

    let cases = repository.cases.lock().await;
    assert!(cases[0].deleted_at.is_some());

    let log = repository.retention_log.lock().await;
    let purge_rows: Vec<_> = log
        .iter()
        .filter(|entry| entry.action == RetentionLogAction::CasePurged)
        .collect();
    assert_eq!(purge_rows.len(), 1);
    assert_eq!(purge_rows[0].triggered_by, RetentionTrigger::AutoRetention);
    assert_eq!(purge_rows[0].performed_by, SYSTEM_ACTOR);

    let removed = store.removed.lock().await;
    assert_eq!(removed.as_slice(), ["exhibits/contract.pdf"]);
    Ok(())
}

#[tokio::test]
async fn sweep_never_selects_case_under_legal_hold() -> AppResult<()> {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let mut case = eligible_case(RetentionPolicy::TenYears);
    case.legal_hold = true;
    repository.cases.lock().await.push(case);

    let report = service(repository.clone(), store).sweep(Utc::now()).await?;

    assert_eq!(report.total_checked, 1);
    assert!(report.purged.is_empty());
    assert!(report.errors.is_empty());
    assert!(repository.retention_log.lock().await.is_empty());
    assert!(repository.cases.lock().await[0].deleted_at.is_none());
    Ok(())
}

#[tokio::test]
async fn sweep_continues_past_a_failing_case() -> AppResult<()> {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let failing = eligible_case(RetentionPolicy::ThreeYears);
    let succeeding = eligible_case(RetentionPolicy::FiveYears);
    let failing_id = failing.id;
    let succeeding_id = succeeding.id;
    repository.cases.lock().await.push(failing);
    repository.cases.lock().await.push(succeeding);
    repository.fail_purge_for.lock().await.insert(failing_id);

    let report = service(repository, store).sweep(Utc::now()).await?;

    assert_eq!(report.total_checked, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].case_id, failing_id);
    assert_eq!(report.purged.len(), 1);
    assert_eq!(report.purged[0].case_id, succeeding_id);
    Ok(())
}

#[tokio::test]
async fn purge_of_missing_case_is_not_found_and_writes_no_log() {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let result = service(repository.clone(), store)
        .purge_case(CaseId::new(), RetentionTrigger::ManualAdmin, "admin")
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(repository.retention_log.lock().await.is_empty());
}

#[tokio::test]
async fn purge_collects_file_errors_and_keeps_them_queued() -> AppResult<()> {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let case = eligible_case(RetentionPolicy::SevenYears);
    let case_id = case.id;
    repository.cases.lock().await.push(case);
    repository
        .documents
        .lock()
        .await
        .push(document_for(case_id, "exhibits/locked.pdf"));
    store
        .fail_for
        .lock()
        .await
        .insert("exhibits/locked.pdf".to_owned());

    let outcome = service(repository.clone(), store.clone())
        .purge_case(case_id, RetentionTrigger::UserRequest, "jdoe")
        .await?;

    assert_eq!(outcome.documents_deleted, 1);
    assert_eq!(outcome.files_deleted, 0);
    assert_eq!(outcome.file_errors.len(), 1);
    assert_eq!(outcome.file_errors[0].stored_filename, "exhibits/locked.pdf");

    // The failed unlink stays queued, with the attempt recorded.
    let pending = repository.pending.lock().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    Ok(())
}

#[tokio::test]
async fn retrying_pending_deletions_drains_queue_and_logs_cleanup_run() -> AppResult<()> {
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    repository.pending.lock().await.push(PendingFileDeletion {
        id: Uuid::new_v4(),
        case_id: CaseId::new(),
        stored_filename: "exhibits/recovered.pdf".to_owned(),
        attempts: 2,
    });

    let retried = service(repository.clone(), store.clone())
        .retry_pending_file_deletions(50)
        .await?;

    assert_eq!(retried, 1);
    assert!(repository.pending.lock().await.is_empty());

    let log = repository.retention_log.lock().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, RetentionLogAction::PendingFilesRetried);
    assert_eq!(log[0].files_affected, 1);
    assert_eq!(log[0].case_id, None);

    let removed = store.removed.lock().await;
    assert_eq!(removed.as_slice(), ["exhibits/recovered.pdf"]);
    Ok(())
}

#[tokio::test]
async fn direct_purge_does_not_recheck_legal_hold() -> AppResult<()> {
    // Eligibility is the caller's contract; an administrative purge of a
    // held case proceeds when invoked directly.
    let repository = Arc::new(FakeCaseRepository::default());
    let store = Arc::new(FakeDocumentStore::default());

    let mut case = eligible_case(RetentionPolicy::SevenYears);
    case.legal_hold = true;
    let case_id = case.id;
    repository.cases.lock().await.push(case);

    let outcome = service(repository.clone(), store)
        .purge_case(case_id, RetentionTrigger::ManualAdmin, "admin")
        .await?;

    assert_eq!(outcome.case_id, case_id);
    assert!(repository.cases.lock().await[0].deleted_at.is_some());
    Ok(())
}
