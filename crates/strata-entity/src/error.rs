//! Error types for entity operations.

use strata_core::{CoreError, FieldErrors};
use strata_db::DbError;
use strata_schema::SchemaError;
use thiserror::Error;

/// Result type for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Errors surfaced by the entity repository and the users store.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Entity absent, soft-deleted, or tombstoned
    #[error("entity not found: {0}")]
    NotFound(String),

    /// An active row with the same entity id already exists
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    /// Input failed field rules
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Schema lookup or payload validation failed
    #[error(transparent)]
    Schema(#[from] SchemaError),

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

impl EntityError {
    /// True for read-path misses at any layer.
    pub fn is_not_found(&self) -> bool {
        match self {
            EntityError::NotFound(_) => true,
            EntityError::Schema(e) => e.is_not_found(),
            EntityError::Db(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// True for uniqueness conflicts.
    pub fn is_conflict(&self) -> bool {
        match self {
            EntityError::AlreadyExists(_) => true,
            EntityError::Schema(e) => e.is_conflict(),
            EntityError::Db(e) => e.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<EntityError> for CoreError {
    fn from(err: EntityError) -> Self {
        match err {
            EntityError::NotFound(what) => CoreError::NotFound(what),
            EntityError::AlreadyExists(what) => CoreError::Conflict(what),
            EntityError::Validation(fields) => CoreError::Validation(fields),
            EntityError::Schema(schema) => schema.into(),
            EntityError::Db(db) => db.into(),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_covers_schema_misses() {
        assert!(EntityError::NotFound("x".into()).is_not_found());
        assert!(EntityError::Schema(SchemaError::NotFound("s".into())).is_not_found());
        assert!(!EntityError::AlreadyExists("x".into()).is_not_found());
    }

    #[test]
    fn test_payload_rejection_surfaces_as_validation() {
        let err = EntityError::Schema(SchemaError::PayloadRejected {
            instance_path: "".into(),
            field: "name".into(),
            reason: "'name' is a required property".into(),
        });
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Validation(_)));
    }
}
