//! Database error types for the Strata persistence engine.

use strata_core::CoreError;
use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL execution error
    #[error("SQL error: {0}")]
    Sql(sqlx::Error),

    /// Unique constraint violation, carrying the constraint name
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Foreign key violation, carrying the constraint name
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),

    /// Connection pool error
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Transaction error
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(String),

    /// A name destined for SQL identifier position failed validation
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Resource not found
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("database configuration error: {0}")]
    Config(String),
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or("<unnamed>").to_string();
            match db_err.code().as_deref() {
                Some("23505") => return DbError::UniqueViolation(constraint),
                Some("23503") => return DbError::ForeignKeyViolation(constraint),
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return DbError::NotFound("row not found".to_string());
        }
        DbError::Sql(err)
    }
}

impl DbError {
    /// Check if error is a unique-constraint conflict
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation(_))
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Check if error is worth retrying on a fresh connection
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Sql(err) => err.as_database_error().is_none(),
            DbError::Pool(_) => true,
            _ => false,
        }
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation(c) => CoreError::Conflict(c),
            DbError::ForeignKeyViolation(c) => CoreError::Conflict(c),
            DbError::NotFound(what) => CoreError::NotFound(what),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_pool_errors_are_retryable() {
        assert!(DbError::Pool("exhausted".into()).is_retryable());
        assert!(!DbError::Migration("bad ddl".into()).is_retryable());
    }

    #[test]
    fn test_core_error_mapping() {
        let core: CoreError = DbError::UniqueViolation("tenants_active_slug_idx".into()).into();
        assert!(core.is_conflict());

        let core: CoreError = DbError::NotFound("tenant".into()).into();
        assert!(core.is_not_found());
    }
}
