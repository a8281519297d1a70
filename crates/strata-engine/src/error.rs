//! Engine-level error type.

use strata_core::CoreError;
use strata_db::DbError;
use strata_entity::EntityError;
use strata_schema::SchemaError;
use strata_tenant::TenantError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Union of the subsystem errors plus configuration loading.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration loading or deserialization failed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Database layer error
    #[error(transparent)]
    Db(#[from] DbError),

    /// Tenant subsystem error
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Schema subsystem error
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Entity subsystem error
    #[error(transparent)]
    Entity(#[from] EntityError),
}

impl EngineError {
    /// Collapses the error into the shared taxonomy for the boundary
    /// layer to render.
    pub fn into_core(self) -> CoreError {
        match self {
            EngineError::Config(e) => CoreError::Internal(e.to_string()),
            EngineError::Db(e) => e.into(),
            EngineError::Tenant(e) => e.into(),
            EngineError::Schema(e) => e.into(),
            EngineError::Entity(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_collapse() {
        let err = EngineError::Tenant(TenantError::SlugConflict("acme".into()));
        assert!(err.into_core().is_conflict());

        let err = EngineError::Schema(SchemaError::NotFound("s".into()));
        assert!(err.into_core().is_not_found());
    }
}
