//! Shared error taxonomy for the persistence engine.
//!
//! Each crate defines its own error enum; all of them convert into
//! [`CoreError`] at the engine boundary, where the HTTP layer maps the
//! taxonomy onto its problem-details envelope.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine-boundary operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Per-field validation messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection holding a single message.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    /// Records a message against a field.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// True when no messages have been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Field -> messages view.
    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// Returns `Ok(())` when empty, `Err(CoreError::Validation)` otherwise.
    pub fn into_result(self) -> CoreResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The abstract error kinds every subsystem surfaces.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed schema or field rules.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Requested record absent or soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// State machine guard rejected the operation.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A provisioner's ensure/check failed.
    #[error("provisioning failed in {component}: {reason}")]
    Provisioning {
        /// Which provisioner failed (db, auth, storage)
        component: String,
        /// Failure reason
        reason: String,
    },

    /// Unexpected failure; details stay in the logs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// True when the error is a normal read-path miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// True when the error is a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }

    /// True when the transaction must roll back. `NotFound` on reads is
    /// a normal outcome, everything else is not.
    pub fn requires_rollback(&self) -> bool {
        !self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate_in_field_order() {
        let mut errors = FieldErrors::new();
        errors.push("slug", "must not be empty");
        errors.push("name", "too long");
        errors.push("slug", "invalid characters");

        let fields: Vec<_> = errors.fields().keys().cloned().collect();
        assert_eq!(fields, vec!["name", "slug"]);
        assert_eq!(errors.fields()["slug"].len(), 2);
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());

        let err = FieldErrors::single("name", "required").into_result();
        match err {
            Err(CoreError::Validation(fields)) => {
                assert_eq!(fields.fields()["name"], vec!["required"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rollback_policy() {
        assert!(!CoreError::NotFound("x".into()).requires_rollback());
        assert!(CoreError::Conflict("x".into()).requires_rollback());
        assert!(CoreError::Internal("x".into()).requires_rollback());
    }

    #[test]
    fn test_display_joins_messages() {
        let mut errors = FieldErrors::new();
        errors.push("a", "first");
        errors.push("b", "second");
        assert_eq!(errors.to_string(), "a: first; b: second");
    }
}
