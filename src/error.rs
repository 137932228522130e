//! Error types for the record graph engine.
//!
//! All errors are strongly typed using thiserror so callers can tell a
//! skippable per-row mapping failure from a run-fatal storage failure.

use thiserror::Error;

use crate::record::RecordId;
use crate::staging::StagingTable;
use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid order key '{key}': {reason}")]
    InvalidKey {
        key: String,
        reason: String,
    },

    #[error("Order key bounds are reversed: lower '{lower}' sorts after upper '{upper}'")]
    InvalidBounds {
        lower: String,
        upper: String,
    },

    #[error("No order key exists strictly between '{lower}' and '{upper}'")]
    NoKeyBetween {
        lower: String,
        upper: String,
    },

    #[error("Rating {value} is out of range [0, 3]")]
    RatingOutOfRange {
        value: u8,
    },

    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Per-row mapping failures.
///
/// These never abort a sync run: the row is logged, counted as failed and
/// left unmapped so the next run picks it up again.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error)]
pub enum MappingError {
    #[error("{table} row '{external_id}' is missing required field '{field}'")]
    MissingField {
        table: StagingTable,
        external_id: String,
        field: &'static str,
    },

    #[error("{table} row '{external_id}' has invalid {field}: {reason}")]
    InvalidValue {
        table: StagingTable,
        external_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("Metadata for '{url}' is unavailable: {reason}")]
    MetadataUnavailable {
        url: String,
        reason: String,
    },

    #[error("Media '{url}' belongs to {owner}, which is not mapped yet")]
    UnmappedOwner {
        url: String,
        owner: String,
    },

    #[error("Mapper for {expected} received a {actual} row")]
    UnexpectedPayload {
        expected: String,
        actual: StagingTable,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Merge precondition violations. Raised before any mutation happens.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("Cannot merge record {id} into itself")]
    SelfMerge {
        id: RecordId,
    },

    #[error("Record not found: {id}")]
    RecordNotFound {
        id: RecordId,
    },
}

/// Top-level error type.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl GraphError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a merge precondition error.
    #[must_use]
    pub const fn is_merge(&self) -> bool {
        matches!(self, Self::Merge(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the operation may succeed.
    ///
    /// Only backend failures qualify; bad input and missing records will
    /// fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => matches!(e, StorageError::BackendError(_)),
            Self::Validation(_) | Self::Mapping(_) | Self::Merge(_) | Self::Internal { .. } => {
                false
            }
        }
    }
}

/// Result type alias for engine operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_message() {
        let err = ValidationError::InvalidKey {
            key: "A!".to_string(),
            reason: "must match ^[a-z0-9]+$".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("A!"));
        assert!(msg.contains("Invalid order key"));
    }

    #[test]
    fn test_mapping_error_names_row() {
        let err = MappingError::MissingField {
            table: StagingTable::GithubRepositories,
            external_id: "42".to_string(),
            field: "full_name",
        };
        let msg = format!("{err}");
        assert!(msg.contains("github_repositories"));
        assert!(msg.contains("'42'"));
        assert!(msg.contains("full_name"));
    }

    #[test]
    fn test_merge_error_self_merge() {
        let err = MergeError::SelfMerge { id: RecordId::new(7) };
        assert!(format!("{err}").contains("into itself"));
    }

    #[test]
    fn test_graph_error_classification() {
        let err: GraphError = ValidationError::RatingOutOfRange { value: 9 }.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err: GraphError = MergeError::RecordNotFound { id: RecordId::new(1) }.into();
        assert!(err.is_merge());
        assert!(!err.is_retryable());

        let err: GraphError = StorageError::BackendError("connection reset".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());

        let err: GraphError = StorageError::DuplicateKey("url".to_string()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error() {
        let err = GraphError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
