//! # Strata Database Layer
//!
//! Connection pooling, admin/tenant database contexts, and admin
//! catalog migrations for the Strata persistence engine.
//!
//! The central piece is [`DbContext`]: every unit of work runs inside a
//! transaction whose role and search path are switched with
//! transaction-local statements, so releasing the connection always
//! restores the session defaults. No raw connection is ever handed out.
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_db::{DbContext, Pool, PoolConfig, TenantScope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(PoolConfig::default()).await?;
//! let ctx = DbContext::new(&pool, "strata_admin")?;
//!
//! let scope = TenantScope::new("dev_acme_co", "dev_acme_co_role")?;
//! let names: Vec<String> = ctx
//!     .with_tenant::<_, strata_db::DbError, _>(&scope, |conn| {
//!         Box::pin(async move {
//!             let rows: Vec<(String,)> =
//!                 sqlx::query_as("SELECT email FROM users").fetch_all(conn).await?;
//!             Ok(rows.into_iter().map(|(email,)| email).collect())
//!         })
//!     })
//!     .await?;
//!
//! println!("{} users", names.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod migrations;
pub mod pool;

// Re-export commonly used types
pub use context::{
    compose_search_path, quote_identifier, validate_identifier, DbContext, ScopedFuture,
    TenantScope,
};
pub use error::{DbError, DbResult};
pub use migrations::{admin_migrations, Migration, MigrationManager};
pub use pool::{HealthStatus, Pool, PoolConfig, PoolStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
