//! Admin-namespace bootstrap with schema versioning.
//!
//! The admin namespace holds the shared catalog: the tenant registry,
//! the schema categories, and the schema repository. Creating it is the
//! single bootstrap entry point; provisioners assume it already exists.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::context::{quote_identifier, validate_identifier};
use crate::error::{DbError, DbResult};
use crate::pool::Pool;

/// Migration metadata
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version
    pub version: i32,
    /// Migration name
    pub name: String,
    /// SQL to run for upgrade
    pub up: String,
    /// SQL to run for downgrade
    pub down: String,
    /// Applied timestamp
    pub applied_at: Option<DateTime<Utc>>,
}

impl Migration {
    /// Create a new migration
    pub fn new(
        version: i32,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            up: up.into(),
            down: down.into(),
            applied_at: None,
        }
    }
}

/// Migration manager for the admin namespace
pub struct MigrationManager {
    pool: PgPool,
    admin_schema: String,
}

impl MigrationManager {
    /// Create a new migration manager
    pub fn new(pool: &Pool, admin_schema: impl Into<String>) -> DbResult<Self> {
        let admin_schema = admin_schema.into();
        validate_identifier(&admin_schema)?;
        Ok(Self {
            pool: pool.inner().clone(),
            admin_schema,
        })
    }

    /// Create the admin namespace and the migration tracking table
    pub async fn init(&self) -> DbResult<()> {
        let schema = quote_identifier(&self.admin_schema);

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Migration(format!("failed to create admin schema: {}", e)))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}._migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            schema
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::Migration(format!("failed to create tracking table: {}", e)))?;

        Ok(())
    }

    /// Versions already applied, ascending
    pub async fn applied_versions(&self) -> DbResult<Vec<i32>> {
        let rows = sqlx::query(&format!(
            "SELECT version FROM {}._migrations ORDER BY version",
            quote_identifier(&self.admin_schema)
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get::<i32, _>("version")).collect())
    }

    /// Apply every pending migration in version order
    pub async fn migrate(&self, migrations: &[Migration]) -> DbResult<usize> {
        let applied = self.applied_versions().await?;
        let mut count = 0;

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by_key(|m| m.version);

        for migration in ordered {
            if applied.contains(&migration.version) {
                continue;
            }

            tracing::info!(
                version = migration.version,
                name = %migration.name,
                "applying migration"
            );

            let mut tx = self.pool.begin().await.map_err(|e| {
                DbError::Migration(format!("failed to begin migration transaction: {}", e))
            })?;

            // raw_sql: migration scripts hold several statements
            sqlx::raw_sql(&migration.up)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DbError::Migration(format!(
                        "migration {} ({}) failed: {}",
                        migration.version, migration.name, e
                    ))
                })?;

            sqlx::query(&format!(
                "INSERT INTO {}._migrations (version, name) VALUES ($1, $2)",
                quote_identifier(&self.admin_schema)
            ))
            .bind(migration.version)
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("failed to record migration: {}", e)))?;

            tx.commit()
                .await
                .map_err(|e| DbError::Migration(format!("failed to commit migration: {}", e)))?;

            count += 1;
        }

        Ok(count)
    }
}

/// The admin catalog migrations, parameterized by the admin namespace.
pub fn admin_migrations(admin_schema: &str) -> Vec<Migration> {
    let schema = quote_identifier(admin_schema);

    vec![
        Migration::new(
            1,
            "create_tenants",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {schema}.tenants (
                    tenant_id UUID NOT NULL,
                    tenant_version_major INTEGER NOT NULL,
                    tenant_version_minor INTEGER NOT NULL,
                    tenant_version_patch INTEGER NOT NULL,
                    slug TEXT NOT NULL,
                    display_name TEXT,
                    status TEXT NOT NULL,
                    schema_name TEXT NOT NULL,
                    role_name TEXT NOT NULL,
                    short_tenant_id TEXT NOT NULL,
                    base_prefix TEXT NOT NULL,
                    db_ready BOOLEAN NOT NULL DEFAULT FALSE,
                    auth_ready BOOLEAN NOT NULL DEFAULT FALSE,
                    storage_ready BOOLEAN NOT NULL DEFAULT FALSE,
                    last_provisioned_at TIMESTAMPTZ,
                    last_error TEXT,
                    is_active BOOLEAN NOT NULL,
                    is_soft_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL,
                    created_by UUID,
                    PRIMARY KEY (tenant_id, tenant_version_major, tenant_version_minor, tenant_version_patch)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS tenants_active_slug_idx
                    ON {schema}.tenants (slug)
                    WHERE is_active AND NOT is_soft_deleted;
                CREATE UNIQUE INDEX IF NOT EXISTS tenants_active_id_idx
                    ON {schema}.tenants (tenant_id)
                    WHERE is_active;
                "#,
                schema = schema
            ),
            format!("DROP TABLE IF EXISTS {}.tenants", schema),
        ),
        Migration::new(
            2,
            "create_schema_categories",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {schema}.schema_categories (
                    category_id UUID PRIMARY KEY,
                    parent_category_id UUID REFERENCES {schema}.schema_categories (category_id),
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    description TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    deleted_at TIMESTAMPTZ
                );
                CREATE UNIQUE INDEX IF NOT EXISTS schema_categories_live_slug_idx
                    ON {schema}.schema_categories (slug)
                    WHERE deleted_at IS NULL;
                "#,
                schema = schema
            ),
            format!("DROP TABLE IF EXISTS {}.schema_categories", schema),
        ),
        Migration::new(
            3,
            "create_schema_repository",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {schema}.schema_repository (
                    schema_id UUID NOT NULL,
                    schema_version_major INTEGER NOT NULL,
                    schema_version_minor INTEGER NOT NULL,
                    schema_version_patch INTEGER NOT NULL,
                    table_name TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    category_id UUID NOT NULL REFERENCES {schema}.schema_categories (category_id),
                    schema_definition JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT FALSE,
                    is_soft_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                    PRIMARY KEY (schema_id, schema_version_major, schema_version_minor, schema_version_patch)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS schema_repository_active_idx
                    ON {schema}.schema_repository (schema_id)
                    WHERE is_active AND NOT is_soft_deleted;
                CREATE UNIQUE INDEX IF NOT EXISTS schema_repository_active_slug_idx
                    ON {schema}.schema_repository (slug)
                    WHERE is_active AND NOT is_soft_deleted;
                CREATE INDEX IF NOT EXISTS schema_repository_table_idx
                    ON {schema}.schema_repository (table_name)
                    WHERE NOT is_soft_deleted;
                "#,
                schema = schema
            ),
            format!("DROP TABLE IF EXISTS {}.schema_repository", schema),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_migrations_are_ordered_and_complete() {
        let migrations = admin_migrations("strata_admin");
        let versions: Vec<i32> = migrations.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        let names: Vec<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "create_tenants",
                "create_schema_categories",
                "create_schema_repository"
            ]
        );
    }

    #[test]
    fn test_tenant_table_carries_uniqueness_predicates() {
        let migrations = admin_migrations("strata_admin");
        let tenants = &migrations[0].up;

        assert!(tenants.contains("tenants_active_slug_idx"));
        assert!(tenants.contains("WHERE is_active AND NOT is_soft_deleted"));
        assert!(tenants.contains(
            "PRIMARY KEY (tenant_id, tenant_version_major, tenant_version_minor, tenant_version_patch)"
        ));
    }

    #[test]
    fn test_schema_repository_constraints() {
        let migrations = admin_migrations("strata_admin");
        let repo = &migrations[2].up;

        assert!(repo.contains("schema_repository_active_idx"));
        assert!(repo.contains("schema_repository_active_slug_idx"));
        assert!(repo.contains("REFERENCES \"strata_admin\".schema_categories"));
    }

    #[test]
    fn test_migrations_interpolate_admin_schema() {
        let migrations = admin_migrations("custom_admin");
        for migration in &migrations {
            assert!(migration.up.contains("\"custom_admin\""));
        }
    }
}
