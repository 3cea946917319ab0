//! Shared primitives for all Rust crates in Casekeep.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type used across Casekeep crates.
pub type AppResult<T> = Result<T, AppError>;

/// Unique identifier for a case record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(Uuid);

impl CaseId {
    /// Creates a new random case identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a case identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Creates a case identifier from its string form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid case id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CaseId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new random document identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a document identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DocumentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Required configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Authenticated-encryption verification failed; data is tampered,
    /// corrupted, or protected by a different key.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// External dump/restore tooling exited abnormally.
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Filesystem operation failed.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::{AppError, CaseId};

    #[test]
    fn case_id_formats_as_uuid() {
        let case_id = CaseId::new();
        assert_eq!(case_id.to_string().len(), 36);
    }

    #[test]
    fn case_id_parse_round_trips() {
        let case_id = CaseId::new();
        let parsed = CaseId::parse(case_id.to_string().as_str());
        assert!(matches!(parsed, Ok(value) if value == case_id));
    }

    #[test]
    fn case_id_parse_rejects_garbage() {
        let parsed = CaseId::parse("not-a-uuid");
        assert!(matches!(parsed, Err(AppError::Validation(_))));
    }
}
