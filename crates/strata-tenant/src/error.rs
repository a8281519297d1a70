//! Error types for tenant operations.

use strata_core::{CoreError, FieldErrors, IdentError};
use strata_db::DbError;
use thiserror::Error;

/// Result type for tenant operations.
pub type TenantResult<T> = Result<T, TenantError>;

/// Errors surfaced by the tenant registry, provisioners, and resolver.
#[derive(Debug, Error)]
pub enum TenantError {
    /// Tenant not found
    #[error("tenant not found: {0}")]
    NotFound(String),

    /// A tenant with the same slug is already active
    #[error("tenant slug already in use: {0}")]
    SlugConflict(String),

    /// Input failed field rules
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// The external descriptor could not be resolved in this environment
    #[error("invalid tenant descriptor: {0}")]
    InvalidDescriptor(String),

    /// A provisioner's ensure/check failed
    #[error("provisioning failed in {component}: {reason}")]
    Provisioning {
        /// Which provisioner failed (db, auth, storage)
        component: String,
        /// Failure reason
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

impl TenantError {
    /// True for read-path misses, including the database's own.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TenantError::NotFound(_))
            || matches!(self, TenantError::Db(e) if e.is_not_found())
    }

    /// True for uniqueness conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TenantError::SlugConflict(_))
            || matches!(self, TenantError::Db(e) if e.is_unique_violation())
    }
}

impl From<validator::ValidationErrors> for TenantError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errors) in err.field_errors() {
            for error in errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                fields.push(field, message);
            }
        }
        TenantError::Validation(fields)
    }
}

impl From<IdentError> for TenantError {
    fn from(err: IdentError) -> Self {
        match &err {
            IdentError::EmptySlug(_) => {
                TenantError::Validation(FieldErrors::single("slug", err.to_string()))
            }
            IdentError::InvalidEnvKey(_) => {
                TenantError::Validation(FieldErrors::single("env_key", err.to_string()))
            }
            IdentError::InvalidDescriptor(raw) => TenantError::InvalidDescriptor(raw.clone()),
        }
    }
}

impl From<TenantError> for CoreError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound(what) => CoreError::NotFound(what),
            TenantError::SlugConflict(slug) => CoreError::Conflict(slug),
            TenantError::Validation(fields) => CoreError::Validation(fields),
            TenantError::InvalidDescriptor(raw) => {
                CoreError::Validation(FieldErrors::single("tenant", raw))
            }
            TenantError::Provisioning { component, reason } => {
                CoreError::Provisioning { component, reason }
            }
            TenantError::Precondition(what) => CoreError::PreconditionFailed(what),
            TenantError::Db(db) => db.into(),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate_covers_db_misses() {
        assert!(TenantError::NotFound("acme".into()).is_not_found());
        assert!(TenantError::Db(DbError::NotFound("row".into())).is_not_found());
        assert!(!TenantError::SlugConflict("acme".into()).is_not_found());
    }

    #[test]
    fn test_conflict_predicate_covers_constraint_violations() {
        assert!(TenantError::SlugConflict("acme".into()).is_conflict());
        assert!(
            TenantError::Db(DbError::UniqueViolation("tenants_active_slug_idx".into()))
                .is_conflict()
        );
    }

    #[test]
    fn test_ident_error_maps_to_field_validation() {
        let err: TenantError = IdentError::EmptySlug("!!!".into()).into();
        match err {
            TenantError::Validation(fields) => assert!(fields.fields().contains_key("slug")),
            other => panic!("expected validation, got {:?}", other),
        }
    }
}
