//! Retention policies and the pure evaluation rules behind automatic purging.
//!
//! Everything in this module is side-effect free: policies map a creation
//! date to a retention deadline, and eligibility is a pure predicate over a
//! case and a clock value. Enforcement lives in the application layer.

use std::str::FromStr;

use casekeep_core::AppError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Actor sentinel written over audit rows when a case is purged.
pub const ANONYMIZED_ACTOR: &str = "anonymized";

/// Replacement payload for audit details stripped during anonymization.
pub const REDACTED_DETAILS: &str = "[redacted]";

/// Legally mandated retention schedule assigned to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Retain for ten years after creation.
    TenYears,
    /// Retain for seven years after creation.
    SevenYears,
    /// Retain for five years after creation.
    FiveYears,
    /// Retain for three years after creation.
    ThreeYears,
    /// Exempt from automatic deletion.
    Indefinite,
    /// Retention deadline is set explicitly by an administrator.
    Custom,
}

impl RetentionPolicy {
    /// Returns a stable storage value for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenYears => "10_years",
            Self::SevenYears => "7_years",
            Self::FiveYears => "5_years",
            Self::ThreeYears => "3_years",
            Self::Indefinite => "indefinite",
            Self::Custom => "custom",
        }
    }

    /// Returns all known policies.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RetentionPolicy] = &[
            RetentionPolicy::TenYears,
            RetentionPolicy::SevenYears,
            RetentionPolicy::FiveYears,
            RetentionPolicy::ThreeYears,
            RetentionPolicy::Indefinite,
            RetentionPolicy::Custom,
        ];

        ALL
    }

    /// Returns the retention period in days, or `None` for policies without
    /// a fixed duration (`Indefinite`, `Custom`).
    #[must_use]
    pub fn period_days(&self) -> Option<i64> {
        match self {
            Self::TenYears => Some(3650),
            Self::SevenYears => Some(2555),
            Self::FiveYears => Some(1825),
            Self::ThreeYears => Some(1095),
            Self::Indefinite | Self::Custom => None,
        }
    }

    /// Computes the retention deadline for a case created at `created_at`.
    ///
    /// Fixed-duration policies yield `created_at` plus the policy period.
    /// `Indefinite` has no deadline; for `Custom` the deadline is supplied
    /// by the caller, so the policy itself yields `None`.
    #[must_use]
    pub fn retention_date_from(&self, created_at: DateTime<Utc>) -> Option<NaiveDate> {
        self.period_days()
            .map(|days| (created_at + Duration::days(days)).date_naive())
    }
}

impl FromStr for RetentionPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "10_years" => Ok(Self::TenYears),
            "7_years" => Ok(Self::SevenYears),
            "5_years" => Ok(Self::FiveYears),
            "3_years" => Ok(Self::ThreeYears),
            "indefinite" => Ok(Self::Indefinite),
            "custom" => Ok(Self::Custom),
            _ => Err(AppError::Validation(format!(
                "unknown retention policy '{value}'"
            ))),
        }
    }
}

/// Origin of a purge or cleanup run, recorded in the retention log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTrigger {
    /// Scheduled retention sweep selected the case.
    AutoRetention,
    /// An administrator requested the purge directly.
    ManualAdmin,
    /// A data-subject request initiated the purge.
    UserRequest,
}

impl RetentionTrigger {
    /// Returns a stable storage value for this trigger.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoRetention => "auto_retention",
            Self::ManualAdmin => "manual_admin",
            Self::UserRequest => "user_request",
        }
    }
}

impl FromStr for RetentionTrigger {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto_retention" => Ok(Self::AutoRetention),
            "manual_admin" => Ok(Self::ManualAdmin),
            "user_request" => Ok(Self::UserRequest),
            _ => Err(AppError::Validation(format!(
                "unknown retention trigger '{value}'"
            ))),
        }
    }
}

/// Kind of run summarized by one retention-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionLogAction {
    /// A case and its dependents were purged.
    CasePurged,
    /// Previously failed document-file deletions were retried.
    PendingFilesRetried,
}

impl RetentionLogAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CasePurged => "case_purged",
            Self::PendingFilesRetried => "pending_files_retried",
        }
    }
}

impl FromStr for RetentionLogAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "case_purged" => Ok(Self::CasePurged),
            "pending_files_retried" => Ok(Self::PendingFilesRetried),
            _ => Err(AppError::Validation(format!(
                "unknown retention log action '{value}'"
            ))),
        }
    }
}
