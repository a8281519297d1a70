//! Tenant-scoped and admin-scoped database contexts.
//!
//! This is the only way the rest of the engine touches the database.
//! Each entry point acquires a pooled connection, opens a transaction,
//! scopes the session to the right principal and namespace, runs the
//! caller's closure against the transaction, and commits or rolls back.
//!
//! The role and search-path changes are transaction-local (`SET LOCAL
//! ROLE`, `set_config(..., is_local => true)`), so any end of the
//! transaction restores the session defaults: commit, rollback, or the
//! rollback sqlx issues when a dropped transaction is returned to the
//! pool. A connection can never re-enter the pool still scoped to a
//! tenant, whichever exit path the closure took, including cancellation
//! (dropping the future drops the transaction).

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgConnection, PgPool};

use crate::error::{DbError, DbResult};
use crate::pool::Pool;

/// The tenant principal and namespace a unit of work executes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    /// Tenant namespace, first entry of the search path
    pub schema_name: String,
    /// Tenant role assumed for the duration of the transaction
    pub role_name: String,
}

impl TenantScope {
    /// Creates a scope, validating both names as SQL identifiers.
    pub fn new(schema_name: impl Into<String>, role_name: impl Into<String>) -> DbResult<Self> {
        let schema_name = schema_name.into();
        let role_name = role_name.into();
        validate_identifier(&schema_name)?;
        validate_identifier(&role_name)?;
        Ok(Self {
            schema_name,
            role_name,
        })
    }
}

/// Checks that a name is a plain lowercase SQL identifier.
///
/// Derived names are always `[a-z][a-z0-9_]*`; anything else never came
/// from the identifier derivation and is rejected before it can reach
/// an identifier position in SQL.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if head_ok && tail_ok && name.len() <= 63 {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quotes an identifier for interpolation into DDL and `SET`
/// statements, which cannot take bind parameters.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Boxed future returned by context closures, in the style of
/// `sqlx`'s own transaction helpers.
pub type ScopedFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Entry point for every unit of database work.
///
/// `with_admin` scopes the transaction to the application principal and
/// the admin namespace; `with_tenant` assumes the tenant's role and puts
/// the tenant namespace at the head of the search path. There is no
/// third entry point and no way to obtain a raw connection.
pub struct DbContext {
    pool: PgPool,
    admin_schema: String,
}

impl DbContext {
    /// Creates a context over a pool, validating the admin namespace name.
    pub fn new(pool: &Pool, admin_schema: impl Into<String>) -> DbResult<Self> {
        let admin_schema = admin_schema.into();
        validate_identifier(&admin_schema)?;
        Ok(Self {
            pool: pool.inner().clone(),
            admin_schema,
        })
    }

    /// The shared admin namespace name.
    pub fn admin_schema(&self) -> &str {
        &self.admin_schema
    }

    /// Runs `f` in a transaction scoped to the application principal and
    /// the admin namespace.
    pub async fn with_admin<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> ScopedFuture<'c, T, E> + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(format!("failed to begin transaction: {}", e)))?;

        // RESET ROLE is transaction-local here because ROLE was never
        // set on this session; SET LOCAL makes the intent explicit.
        sqlx::query("SET LOCAL ROLE NONE")
            .execute(&mut *tx)
            .await
            .map_err(|e| E::from(DbError::from(e)))?;

        sqlx::query("SELECT set_config('search_path', $1, true)")
            .bind(&self.admin_schema)
            .execute(&mut *tx)
            .await
            .map_err(|e| E::from(DbError::from(e)))?;

        let result = f(&mut *tx).await;
        finish(tx, result).await
    }

    /// Runs `f` in a transaction executing as the tenant's principal
    /// with the tenant namespace at the head of the search path.
    ///
    /// The application principal must be a member of the tenant role;
    /// provisioning grants that membership.
    pub async fn with_tenant<T, E, F>(&self, scope: &TenantScope, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> ScopedFuture<'c, T, E> + Send,
    {
        validate_identifier(&scope.schema_name).map_err(E::from)?;
        validate_identifier(&scope.role_name).map_err(E::from)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(format!("failed to begin transaction: {}", e)))?;

        // SET ROLE takes no bind parameters; the name was validated and
        // is quoted anyway.
        let set_role = format!("SET LOCAL ROLE {}", quote_identifier(&scope.role_name));
        sqlx::query(&set_role)
            .execute(&mut *tx)
            .await
            .map_err(|e| E::from(DbError::from(e)))?;

        sqlx::query("SELECT set_config('search_path', $1, true)")
            .bind(self.search_path_for(scope))
            .execute(&mut *tx)
            .await
            .map_err(|e| E::from(DbError::from(e)))?;

        tracing::debug!(
            schema = %scope.schema_name,
            role = %scope.role_name,
            "entered tenant scope"
        );

        let result = f(&mut *tx).await;
        finish(tx, result).await
    }

    /// Search path installed for a tenant transaction.
    pub fn search_path_for(&self, scope: &TenantScope) -> String {
        compose_search_path(&scope.schema_name, &self.admin_schema)
    }
}

/// Search path for a tenant transaction: the tenant namespace first,
/// then the shared admin catalog.
pub fn compose_search_path(tenant_schema: &str, admin_schema: &str) -> String {
    format!("{}, {}", tenant_schema, admin_schema)
}

/// Commits on `Ok`, rolls back on `Err`, preferring the closure's error
/// over a rollback failure.
async fn finish<T, E>(
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    result: Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| DbError::Transaction(format!("failed to commit: {}", e)))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed after operation error");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("dev_acme_co").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("dev_acme_co_role").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1starts_with_digit").is_err());
        assert!(validate_identifier("has-hyphen").is_err());
        assert!(validate_identifier("Upper").is_err());
        assert!(validate_identifier("drop table; --").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("dev_acme"), "\"dev_acme\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_tenant_scope_rejects_invalid_names() {
        assert!(TenantScope::new("dev_acme", "dev_acme_role").is_ok());
        assert!(TenantScope::new("dev-acme", "dev_acme_role").is_err());
        assert!(TenantScope::new("dev_acme", "role; DROP ROLE admin").is_err());
    }

    #[test]
    fn test_search_path_puts_tenant_first() {
        let scope = TenantScope::new("dev_acme_co", "dev_acme_co_role").unwrap();
        assert_eq!(
            compose_search_path(&scope.schema_name, "strata_admin"),
            "dev_acme_co, strata_admin"
        );
    }
}
