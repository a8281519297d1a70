//! Error types for the schema catalog and repository.

use strata_core::{CoreError, FieldErrors};
use strata_db::DbError;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors surfaced by the category catalog, the schema repository, and
/// the validator cache.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema version or category not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness conflict (slug in use, table already bound)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed field rules
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// The schema definition itself does not compile; a configuration
    /// fault, not a payload fault
    #[error("schema definition does not compile: {0}")]
    InvalidDefinition(String),

    /// A payload failed validation against a compiled schema
    #[error("payload rejected at '{instance_path}': {reason}")]
    PayloadRejected {
        /// JSON pointer to the first failing instance location
        instance_path: String,
        /// Field name the failure is attributed to
        field: String,
        /// Why the payload was rejected
        reason: String,
    },

    /// State machine guard rejected the operation
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Database error
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchemaError {
    /// True for read-path misses, including the database's own.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaError::NotFound(_))
            || matches!(self, SchemaError::Db(e) if e.is_not_found())
    }

    /// True for uniqueness conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SchemaError::Conflict(_))
            || matches!(self, SchemaError::Db(e) if e.is_unique_violation())
    }
}

impl From<SchemaError> for CoreError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::NotFound(what) => CoreError::NotFound(what),
            SchemaError::Conflict(what) => CoreError::Conflict(what),
            SchemaError::Validation(fields) => CoreError::Validation(fields),
            SchemaError::InvalidDefinition(reason) => {
                CoreError::Validation(FieldErrors::single("schema_definition", reason))
            }
            SchemaError::PayloadRejected { field, reason, .. } => {
                CoreError::Validation(FieldErrors::single(field, reason))
            }
            SchemaError::Precondition(what) => CoreError::PreconditionFailed(what),
            SchemaError::Db(db) => db.into(),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_rejection_maps_to_field_validation() {
        let err = SchemaError::PayloadRejected {
            instance_path: "".into(),
            field: "name".into(),
            reason: "'name' is a required property".into(),
        };
        let core: CoreError = err.into();
        match core {
            CoreError::Validation(fields) => assert!(fields.fields().contains_key("name")),
            other => panic!("expected validation, got {:?}", other),
        }
    }

    #[test]
    fn test_definition_fault_is_not_a_payload_fault() {
        let err = SchemaError::InvalidDefinition("bad keyword".into());
        assert!(!matches!(err, SchemaError::PayloadRejected { .. }));
    }
}
