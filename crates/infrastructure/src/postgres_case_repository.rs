//! PostgreSQL-backed case repository and the transactional cascading purge.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use casekeep_application::{
    CaseRepository, PendingFileDeletion, PurgeTransactionInput, PurgeTransactionRecord,
    RetentionLogEntry,
};
use casekeep_core::{AppError, AppResult, CaseId};
use casekeep_domain::{
    ANONYMIZED_ACTOR, Case, REDACTED_DETAILS, RetentionLogAction, RetentionPolicy,
};


/// PostgreSQL adapter for [`CaseRepository`].
///
/// Every write of one purge happens inside a single transaction. Physical
/// document-file unlinks are not part of it; the transaction only queues
/// them into `pending_file_deletions` for removal after commit.
#[derive(Clone)]
pub struct PostgresCaseRepository {
    pool: PgPool,
}

impl PostgresCaseRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CaseRow {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    retention_policy: String,
    retention_date: Option<NaiveDate>,
    legal_hold: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl CaseRow {
    fn into_case(self) -> AppResult<Case> {
        let retention_policy =
            RetentionPolicy::from_str(self.retention_policy.as_str()).map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored retention policy '{}' for case '{}': {error}",
                    self.retention_policy, self.id
                ))
            })?;

        Ok(Case {
            id: CaseId::from_uuid(self.id),
            title: self.title,
            created_at: self.created_at,
            retention_policy,
            retention_date: self.retention_date,
            legal_hold: self.legal_hold,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PendingFileDeletionRow {
    id: Uuid,
    case_id: Uuid,
    stored_filename: String,
    attempts: i32,
}

impl PendingFileDeletionRow {
    fn into_entry(self) -> AppResult<PendingFileDeletion> {
        Ok(PendingFileDeletion {
            id: self.id,
            case_id: CaseId::from_uuid(self.case_id),
            stored_filename: self.stored_filename,
            attempts: u32::try_from(self.attempts).map_err(|_| {
                AppError::Internal(format!(
                    "invalid stored attempt count '{}' for pending deletion '{}'",
                    self.attempts, self.id
                ))
            })?,
        })
    }
}

#[async_trait]
impl CaseRepository for PostgresCaseRepository {
    async fn find_case(&self, case_id: CaseId) -> AppResult<Option<Case>> {
        let row = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, title, created_at, retention_policy, retention_date, legal_hold, deleted_at
            FROM cases
            WHERE id = $1
            "#,
        )
        .bind(case_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load case '{case_id}': {error}")))?;

        row.map(CaseRow::into_case).transpose()
    }

    async fn list_active_cases(&self) -> AppResult<Vec<Case>> {
        let rows = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, title, created_at, retention_policy, retention_date, legal_hold, deleted_at
            FROM cases
            WHERE deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active cases: {error}")))?;

        rows.into_iter().map(CaseRow::into_case).collect()
    }

    async fn purge_case(&self, input: PurgeTransactionInput) -> AppResult<PurgeTransactionRecord> {
        let case_uuid = input.case_id.as_uuid();
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start purge transaction for case '{}': {error}",
                input.case_id
            ))
        })?;

        let exists = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM cases
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(case_uuid)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to lock case '{}' for purge: {error}",
                input.case_id
            ))
        })?;

        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "case '{}' not found",
                input.case_id
            )));
        }

        let document_files = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT id, stored_filename
            FROM documents
            WHERE case_id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(case_uuid)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list documents for case '{}': {error}",
                input.case_id
            ))
        })?;

        let documents_deleted = sqlx::query(
            r#"
            UPDATE documents
            SET deleted_at = now()
            WHERE case_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(case_uuid)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to soft-delete documents for case '{}': {error}",
                input.case_id
            ))
        })?
        .rows_affected();

        sqlx::query(
            r#"
            DELETE FROM document_tags
            WHERE document_id IN (SELECT id FROM documents WHERE case_id = $1)
            "#,
        )
        .bind(case_uuid)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete document tags for case '{}': {error}",
                input.case_id
            ))
        })?;

        let audit_entries_anonymized = sqlx::query(
            r#"
            UPDATE audit_logs
            SET actor = $2, details = $3, anonymized = TRUE
            WHERE case_id = $1
            "#,
        )
        .bind(case_uuid)
        .bind(ANONYMIZED_ACTOR)
        .bind(REDACTED_DETAILS)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to anonymize audit rows for case '{}': {error}",
                input.case_id
            ))
        })?
        .rows_affected();

        let notifications_deleted = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE case_id = $1
            "#,
        )
        .bind(case_uuid)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete notifications for case '{}': {error}",
                input.case_id
            ))
        })?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE cases
            SET deleted_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(case_uuid)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to soft-delete case '{}': {error}",
                input.case_id
            ))
        })?;

        let mut pending_deletions = Vec::with_capacity(document_files.len());
        for (_, stored_filename) in &document_files {
            let entry_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO pending_file_deletions (id, case_id, stored_filename)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(entry_id)
            .bind(case_uuid)
            .bind(stored_filename)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to queue file deletion for case '{}': {error}",
                    input.case_id
                ))
            })?;

            pending_deletions.push(PendingFileDeletion {
                id: entry_id,
                case_id: input.case_id,
                stored_filename: stored_filename.clone(),
                attempts: 0,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO retention_log (
                id, action, case_id, documents_deleted, files_affected,
                notifications_deleted, audit_entries_anonymized,
                triggered_by, performed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(RetentionLogAction::CasePurged.as_str())
        .bind(case_uuid)
        .bind(i64::try_from(documents_deleted).unwrap_or(i64::MAX))
        .bind(i64::try_from(document_files.len()).unwrap_or(i64::MAX))
        .bind(i64::try_from(notifications_deleted).unwrap_or(i64::MAX))
        .bind(i64::try_from(audit_entries_anonymized).unwrap_or(i64::MAX))
        .bind(input.trigger.as_str())
        .bind(input.performed_by.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append retention log for case '{}': {error}",
                input.case_id
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit purge transaction for case '{}': {error}",
                input.case_id
            ))
        })?;

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
        let rows = sqlx::query_as::<_, PendingFileDeletionRow>(
            r#"
            SELECT id, case_id, stored_filename, attempts
            FROM pending_file_deletions
            ORDER BY queued_at
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list pending file deletions: {error}"))
        })?;

        rows.into_iter()
            .map(PendingFileDeletionRow::into_entry)
            .collect()
    }

    async fn resolve_pending_file_deletion(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM pending_file_deletions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to resolve pending file deletion '{id}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn record_pending_file_deletion_failure(&self, id: Uuid, error: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE pending_file_deletions
            SET attempts = attempts + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record pending file deletion failure '{id}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn append_retention_log(&self, entry: RetentionLogEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO retention_log (
                id, action, case_id, documents_deleted, files_affected,
                notifications_deleted, audit_entries_anonymized,
                triggered_by, performed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.action.as_str())
        .bind(entry.case_id.map(|case_id| case_id.as_uuid()))
        .bind(i64::try_from(entry.documents_deleted).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.files_affected).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.notifications_deleted).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.audit_entries_anonymized).unwrap_or(i64::MAX))
        .bind(entry.triggered_by.as_str())
        .bind(entry.performed_by.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to append retention log entry: {error}"))
        })?;

        Ok(())
    }
}
