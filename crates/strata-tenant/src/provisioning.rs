//! Tenant provisioning: database artifacts, external auth, and object
//! storage.
//!
//! Every provisioner exposes idempotent `ensure` and `check`
//! operations. A tenant becomes `active` only when all three report
//! ready; otherwise it stays in `provisioning` with the failure
//! recorded on the registry row.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_db::{quote_identifier, DbContext, DbError};

use crate::error::{TenantError, TenantResult};
use crate::registry::TenantRegistry;
use crate::tenant::{ReadinessFlags, TenantRecord, TenantSpace, TenantStatus};

/// Outcome of a single provisioner's ensure/check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    /// Whether the provisioned artifact is fully usable
    pub ready: bool,
    /// Failure reason when not ready
    pub last_error: Option<String>,
}

impl Readiness {
    /// A ready outcome.
    pub fn ready() -> Self {
        Self {
            ready: true,
            last_error: None,
        }
    }

    /// A failed outcome carrying the reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            last_error: Some(reason.into()),
        }
    }
}

/// Aggregated readiness across the three provisioners.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningReport {
    /// Database artifacts
    pub db: Readiness,
    /// External auth tenant
    pub auth: Readiness,
    /// Object-storage prefix
    pub storage: Readiness,
}

impl ProvisioningReport {
    /// True when every component is ready.
    pub fn all_ready(&self) -> bool {
        self.db.ready && self.auth.ready && self.storage.ready
    }

    /// The first failure reason, prefixed with its component.
    pub fn first_error(&self) -> Option<String> {
        [
            ("db", &self.db),
            ("auth", &self.auth),
            ("storage", &self.storage),
        ]
        .iter()
        .find_map(|(component, readiness)| {
            readiness
                .last_error
                .as_ref()
                .map(|reason| format!("{}: {}", component, reason))
        })
    }

    /// Readiness flags for the tenant registry row.
    pub fn flags(&self) -> ReadinessFlags {
        ReadinessFlags {
            db_ready: self.db.ready,
            auth_ready: self.auth.ready,
            storage_ready: self.storage.ready,
        }
    }

    /// The tenant status this report implies.
    pub fn status(&self) -> TenantStatus {
        if self.all_ready() {
            TenantStatus::Active
        } else {
            TenantStatus::Provisioning
        }
    }
}

/// External auth tenant provisioner.
#[async_trait]
pub trait AuthProvisioner: Send + Sync {
    /// Idempotently creates the auth-side tenant.
    async fn ensure(&self, space: &TenantSpace) -> TenantResult<Readiness>;

    /// Non-destructively verifies the auth-side tenant exists.
    async fn check(&self, space: &TenantSpace) -> TenantResult<Readiness>;
}

/// Object-storage prefix provisioner.
#[async_trait]
pub trait StorageProvisioner: Send + Sync {
    /// Idempotently creates the tenant's base prefix.
    async fn ensure(&self, space: &TenantSpace) -> TenantResult<Readiness>;

    /// Non-destructively verifies the base prefix exists.
    async fn check(&self, space: &TenantSpace) -> TenantResult<Readiness>;
}

/// Auth provisioner used by bootstrap tooling; always ready.
pub struct NoopAuthProvisioner;

#[async_trait]
impl AuthProvisioner for NoopAuthProvisioner {
    async fn ensure(&self, _space: &TenantSpace) -> TenantResult<Readiness> {
        Ok(Readiness::ready())
    }

    async fn check(&self, _space: &TenantSpace) -> TenantResult<Readiness> {
        Ok(Readiness::ready())
    }
}

/// Storage provisioner used by bootstrap tooling; always ready.
pub struct NoopStorageProvisioner;

#[async_trait]
impl StorageProvisioner for NoopStorageProvisioner {
    async fn ensure(&self, _space: &TenantSpace) -> TenantResult<Readiness> {
        Ok(Readiness::ready())
    }

    async fn check(&self, _space: &TenantSpace) -> TenantResult<Readiness> {
        Ok(Readiness::ready())
    }
}

/// Local-filesystem storage provisioner rooted at a directory.
pub struct LocalStorageProvisioner {
    root: PathBuf,
}

impl LocalStorageProvisioner {
    /// Creates a provisioner that materializes base prefixes under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn prefix_path(&self, space: &TenantSpace) -> PathBuf {
        self.root.join(space.base_prefix.trim_end_matches('/'))
    }
}

#[async_trait]
impl StorageProvisioner for LocalStorageProvisioner {
    async fn ensure(&self, space: &TenantSpace) -> TenantResult<Readiness> {
        let path = self.prefix_path(space);
        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => Ok(Readiness::ready()),
            Err(e) => Ok(Readiness::failed(format!(
                "failed to create {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn check(&self, space: &TenantSpace) -> TenantResult<Readiness> {
        let path = self.prefix_path(space);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Readiness::ready()),
            Ok(_) => Ok(Readiness::failed(format!(
                "{} exists but is not a directory",
                path.display()
            ))),
            Err(_) => Ok(Readiness::failed(format!(
                "base prefix {} does not exist",
                path.display()
            ))),
        }
    }
}

/// Statements run by the database provisioner, in order.
///
/// Role creation cannot use `IF NOT EXISTS`, so the caller guards it
/// with an existence probe; everything else is naturally idempotent.
pub(crate) mod ddl {
    use super::quote_identifier;

    pub fn create_role(role: &str) -> String {
        format!("CREATE ROLE {} NOLOGIN", quote_identifier(role))
    }

    pub fn create_schema(schema: &str, role: &str) -> String {
        format!(
            "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
            quote_identifier(schema),
            quote_identifier(role)
        )
    }

    pub fn grant_membership(role: &str) -> String {
        format!("GRANT {} TO CURRENT_USER", quote_identifier(role))
    }

    pub fn grant_schema_usage(schema: &str, role: &str) -> String {
        format!(
            "GRANT USAGE ON SCHEMA {} TO {}",
            quote_identifier(schema),
            quote_identifier(role)
        )
    }

    // REFERENCES lets tenant tables declare foreign keys into the
    // shared catalog.
    pub fn grant_catalog_read(admin_schema: &str, table: &str, role: &str) -> String {
        format!(
            "GRANT SELECT, REFERENCES ON {}.{} TO {}",
            quote_identifier(admin_schema),
            quote_identifier(table),
            quote_identifier(role)
        )
    }

    pub fn default_table_privileges(schema: &str, role: &str) -> String {
        format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {role} IN SCHEMA {schema} \
             GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {role}",
            role = quote_identifier(role),
            schema = quote_identifier(schema)
        )
    }

    pub fn default_sequence_privileges(schema: &str, role: &str) -> String {
        format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {role} IN SCHEMA {schema} \
             GRANT USAGE, SELECT ON SEQUENCES TO {role}",
            role = quote_identifier(role),
            schema = quote_identifier(schema)
        )
    }

    pub fn create_users_table(schema: &str) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}.users (
                user_id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            quote_identifier(schema)
        )
    }
}

/// Tables in the shared catalog that tenant roles may read and reference.
const CATALOG_TABLES: [&str; 2] = ["schema_repository", "schema_categories"];

/// Provisions the database artifacts a tenant namespace needs.
pub struct DbProvisioner {
    ctx: Arc<DbContext>,
}

impl DbProvisioner {
    /// Creates a provisioner over the admin context.
    pub fn new(ctx: Arc<DbContext>) -> Self {
        Self { ctx }
    }

    /// Idempotently creates role, namespace, grants, default
    /// privileges, and base tables for a tenant.
    pub async fn ensure(&self, space: &TenantSpace) -> TenantResult<Readiness> {
        let admin_schema = self.ctx.admin_schema().to_string();
        let scoped = space.clone();
        let outcome = self
            .ctx
            .with_admin::<(), TenantError, _>(move |conn| {
                let space = scoped;
                Box::pin(async move {
                    let role_exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM pg_roles WHERE rolname = $1)",
                    )
                    .bind(&space.role_name)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    if !role_exists {
                        sqlx::query(&ddl::create_role(&space.role_name))
                            .execute(&mut *conn)
                            .await
                            .map_err(DbError::from)?;
                    }

                    let statements = [
                        ddl::create_schema(&space.schema_name, &space.role_name),
                        ddl::grant_membership(&space.role_name),
                        ddl::grant_schema_usage(&space.schema_name, &space.role_name),
                        ddl::grant_schema_usage(&admin_schema, &space.role_name),
                        ddl::grant_catalog_read(&admin_schema, CATALOG_TABLES[0], &space.role_name),
                        ddl::grant_catalog_read(&admin_schema, CATALOG_TABLES[1], &space.role_name),
                        ddl::default_table_privileges(&space.schema_name, &space.role_name),
                        ddl::default_sequence_privileges(&space.schema_name, &space.role_name),
                    ];

                    for statement in &statements {
                        sqlx::query(statement)
                            .execute(&mut *conn)
                            .await
                            .map_err(DbError::from)?;
                    }

                    // Base tables are owned by the tenant role so the
                    // default privileges above apply to them.
                    let assume_role =
                        format!("SET LOCAL ROLE {}", quote_identifier(&space.role_name));
                    sqlx::query(&assume_role)
                        .execute(&mut *conn)
                        .await
                        .map_err(DbError::from)?;
                    sqlx::query(&ddl::create_users_table(&space.schema_name))
                        .execute(&mut *conn)
                        .await
                        .map_err(DbError::from)?;
                    sqlx::query("SET LOCAL ROLE NONE")
                        .execute(&mut *conn)
                        .await
                        .map_err(DbError::from)?;

                    Ok(())
                })
            })
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(schema = %space.schema_name, "database artifacts ensured");
                Ok(Readiness::ready())
            }
            Err(e) => Ok(Readiness::failed(e.to_string())),
        }
    }

    /// Non-destructively verifies every artifact `ensure` creates.
    pub async fn check(&self, space: &TenantSpace) -> TenantResult<Readiness> {
        let admin_schema = self.ctx.admin_schema().to_string();
        let scoped = space.clone();
        self.ctx
            .with_admin::<Readiness, TenantError, _>(move |conn| {
                let space = scoped;
                Box::pin(async move {
                    let role_exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM pg_roles WHERE rolname = $1)",
                    )
                    .bind(&space.role_name)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
                    if !role_exists {
                        return Ok(Readiness::failed(format!(
                            "role {} does not exist",
                            space.role_name
                        )));
                    }

                    let schema_exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM information_schema.schemata \
                         WHERE schema_name = $1)",
                    )
                    .bind(&space.schema_name)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
                    if !schema_exists {
                        return Ok(Readiness::failed(format!(
                            "schema {} does not exist",
                            space.schema_name
                        )));
                    }

                    let member: bool =
                        sqlx::query_scalar("SELECT pg_has_role(CURRENT_USER, $1, 'MEMBER')")
                            .bind(&space.role_name)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)?;
                    if !member {
                        return Ok(Readiness::failed(format!(
                            "application principal is not a member of {}",
                            space.role_name
                        )));
                    }

                    let usage: bool =
                        sqlx::query_scalar("SELECT has_schema_privilege($1, $2, 'USAGE')")
                            .bind(&space.role_name)
                            .bind(&space.schema_name)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)?;
                    if !usage {
                        return Ok(Readiness::failed(format!(
                            "{} lacks USAGE on {}",
                            space.role_name, space.schema_name
                        )));
                    }

                    for table in CATALOG_TABLES {
                        let readable: bool =
                            sqlx::query_scalar("SELECT has_table_privilege($1, $2, 'SELECT')")
                                .bind(&space.role_name)
                                .bind(format!("{}.{}", admin_schema, table))
                                .fetch_one(&mut *conn)
                                .await
                                .map_err(DbError::from)?;
                        if !readable {
                            return Ok(Readiness::failed(format!(
                                "{} cannot read catalog table {}",
                                space.role_name, table
                            )));
                        }
                    }

                    let users_table: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
                         WHERE table_schema = $1 AND table_name = 'users')",
                    )
                    .bind(&space.schema_name)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
                    if !users_table {
                        return Ok(Readiness::failed("users base table missing".to_string()));
                    }

                    Ok(Readiness::ready())
                })
            })
            .await
    }
}

/// Orchestrates the three provisioners and records the outcome on the
/// tenant registry.
pub struct TenantProvisioner {
    registry: Arc<TenantRegistry>,
    db: Arc<DbProvisioner>,
    auth: Arc<dyn AuthProvisioner>,
    storage: Arc<dyn StorageProvisioner>,
}

impl TenantProvisioner {
    /// Wires the orchestrator.
    pub fn new(
        registry: Arc<TenantRegistry>,
        db: Arc<DbProvisioner>,
        auth: Arc<dyn AuthProvisioner>,
        storage: Arc<dyn StorageProvisioner>,
    ) -> Self {
        Self {
            registry,
            db,
            auth,
            storage,
        }
    }

    /// Runs every `ensure`, records the outcome, and returns the new
    /// tenant row. Individual failures do not abort the run; they are
    /// captured in the report.
    pub async fn provision(&self, tenant_id: uuid::Uuid) -> TenantResult<TenantRecord> {
        let record = self.registry.get_active(tenant_id).await?;
        let space = record.space();

        tracing::info!(tenant = %record.slug, "provisioning started");

        let report = ProvisioningReport {
            db: self.run(self.db.ensure(&space), "db").await,
            auth: self.run(self.auth.ensure(&space), "auth").await,
            storage: self.run(self.storage.ensure(&space), "storage").await,
        };

        let status = report.status();
        let error = report.first_error();
        if let Some(reason) = &error {
            tracing::warn!(tenant = %record.slug, reason = %reason, "provisioning incomplete");
        } else {
            tracing::info!(tenant = %record.slug, "provisioning complete");
        }

        self.registry
            .update_provisioning(tenant_id, status, report.flags(), error)
            .await
    }

    /// Runs every `check` without touching any state.
    pub async fn check(&self, tenant_id: uuid::Uuid) -> TenantResult<ProvisioningReport> {
        let record = self.registry.get_active(tenant_id).await?;
        let space = record.space();

        Ok(ProvisioningReport {
            db: self.run(self.db.check(&space), "db").await,
            auth: self.run(self.auth.check(&space), "auth").await,
            storage: self.run(self.storage.check(&space), "storage").await,
        })
    }

    async fn run(
        &self,
        op: impl std::future::Future<Output = TenantResult<Readiness>>,
        component: &str,
    ) -> Readiness {
        match op.await {
            Ok(readiness) => readiness,
            Err(e) => Readiness::failed(format!("{} provisioner error: {}", component, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantRecordBuilder;

    fn space() -> TenantSpace {
        TenantRecordBuilder::new()
            .env_key("dev")
            .slug("acme-co")
            .build()
            .unwrap()
            .space()
    }

    #[test]
    fn test_report_aggregation() {
        let report = ProvisioningReport {
            db: Readiness::ready(),
            auth: Readiness::ready(),
            storage: Readiness::ready(),
        };
        assert!(report.all_ready());
        assert_eq!(report.status(), TenantStatus::Active);
        assert!(report.first_error().is_none());

        let report = ProvisioningReport {
            db: Readiness::ready(),
            auth: Readiness::failed("upstream 502"),
            storage: Readiness::failed("bucket missing"),
        };
        assert!(!report.all_ready());
        assert_eq!(report.status(), TenantStatus::Provisioning);
        assert_eq!(report.first_error().unwrap(), "auth: upstream 502");
        assert!(!report.flags().auth_ready);
        assert!(report.flags().db_ready);
    }

    #[test]
    fn test_ddl_statements_quote_identifiers() {
        assert_eq!(
            ddl::create_role("dev_acme_co_role"),
            "CREATE ROLE \"dev_acme_co_role\" NOLOGIN"
        );
        assert_eq!(
            ddl::create_schema("dev_acme_co", "dev_acme_co_role"),
            "CREATE SCHEMA IF NOT EXISTS \"dev_acme_co\" AUTHORIZATION \"dev_acme_co_role\""
        );
        assert_eq!(
            ddl::grant_membership("dev_acme_co_role"),
            "GRANT \"dev_acme_co_role\" TO CURRENT_USER"
        );
        assert!(ddl::grant_catalog_read("strata_admin", "schema_repository", "r")
            .contains("SELECT, REFERENCES"));
        assert!(ddl::default_table_privileges("dev_acme_co", "dev_acme_co_role")
            .starts_with("ALTER DEFAULT PRIVILEGES FOR ROLE"));
        assert!(ddl::create_users_table("dev_acme_co").contains("\"dev_acme_co\".users"));
    }

    #[tokio::test]
    async fn test_noop_provisioners_always_ready() {
        let space = space();
        assert!(NoopAuthProvisioner.ensure(&space).await.unwrap().ready);
        assert!(NoopAuthProvisioner.check(&space).await.unwrap().ready);
        assert!(NoopStorageProvisioner.ensure(&space).await.unwrap().ready);
        assert!(NoopStorageProvisioner.check(&space).await.unwrap().ready);
    }

    #[tokio::test]
    async fn test_local_storage_provisioner_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalStorageProvisioner::new(dir.path());
        let space = space();

        // missing before ensure
        let before = provisioner.check(&space).await.unwrap();
        assert!(!before.ready);

        let ensured = provisioner.ensure(&space).await.unwrap();
        assert!(ensured.ready);

        let after = provisioner.check(&space).await.unwrap();
        assert!(after.ready);

        // ensure is idempotent
        let again = provisioner.ensure(&space).await.unwrap();
        assert!(again.ready);
    }
}
