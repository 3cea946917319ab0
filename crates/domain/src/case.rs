//! Case and document entities owned by the system of record.

use casekeep_core::{CaseId, DocumentId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::retention::RetentionPolicy;

/// A legal matter tracked by the platform.
///
/// `deleted_at` is monotonic: once a case is soft-deleted the timestamp is
/// never cleared. Purging sets it; nothing unsets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// Unique case identifier.
    pub id: CaseId,
    /// Human-readable case title.
    pub title: String,
    /// Creation timestamp, the anchor for fixed-duration retention.
    pub created_at: DateTime<Utc>,
    /// Retention schedule assigned to the case.
    pub retention_policy: RetentionPolicy,
    /// Deadline after which the case becomes eligible for purging.
    ///
    /// `None` for `Indefinite` policies and for `Custom` policies whose
    /// deadline has not been set yet.
    pub retention_date: Option<NaiveDate>,
    /// Administrative hold that unconditionally suppresses automatic
    /// deletion, irrespective of any retention deadline.
    pub legal_hold: bool,
    /// Soft-deletion marker; set at most once.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Case {
    /// Evaluates whether this case may be purged at `now`.
    ///
    /// A case is eligible only when it carries no legal hold, is not
    /// retained indefinitely, has a retention deadline, has not already
    /// been deleted, and `now` falls strictly after that deadline.
    #[must_use]
    pub fn is_eligible_for_purge(&self, now: DateTime<Utc>) -> bool {
        if self.legal_hold || self.deleted_at.is_some() {
            return false;
        }

        if self.retention_policy == RetentionPolicy::Indefinite {
            return false;
        }

        match self.retention_date {
            Some(retention_date) => now.date_naive() > retention_date,
            None => false,
        }
    }
}

/// A file attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub id: DocumentId,
    /// Case this document belongs to.
    pub case_id: CaseId,
    /// Identifier of the backing file in document storage.
    pub stored_filename: String,
    /// Soft-deletion marker; set by the purge.
    pub deleted_at: Option<DateTime<Utc>>,
}
