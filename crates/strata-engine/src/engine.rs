//! Engine assembly.
//!
//! The engine is the single constructed value owning the connection
//! pool and the two process-wide caches (compiled validators, tenant
//! resolution). Everything else hangs off it; there is no package-level
//! mutable state anywhere in the workspace.

use std::sync::Arc;

use strata_core::{Page, PageRequest};
use strata_db::{
    admin_migrations, DbContext, HealthStatus, MigrationManager, Pool, PoolStats,
};
use strata_entity::{EntityRepository, UserStore};
use strata_schema::{CategoryCatalog, SchemaStore, ValidatorCache};
use strata_tenant::{
    AuthProvisioner, DbProvisioner, LocalStorageProvisioner, NoopAuthProvisioner,
    NoopStorageProvisioner, ProvisioningReport, ResolutionCache, StorageProvisioner,
    TenantDirectory, TenantProvisioner, TenantRecord, TenantRecordBuilder, TenantRegistry,
    TenantSpace, TenantStatus,
};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// Slug of the tenant created by `bootstrap_admin_tenant`.
const ADMIN_TENANT_SLUG: &str = "admin";

/// The assembled persistence engine.
pub struct Engine {
    config: EngineConfig,
    pool: Pool,
    ctx: Arc<DbContext>,
    validators: Arc<ValidatorCache>,
    resolution_cache: Arc<ResolutionCache>,
    registry: Arc<TenantRegistry>,
    directory: TenantDirectory,
    categories: CategoryCatalog,
    schemas: SchemaStore,
    users: UserStore,
    provisioner: TenantProvisioner,
}

impl Engine {
    /// Connects with the no-op auth provisioner and a storage
    /// provisioner chosen from the configuration.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let storage: Arc<dyn StorageProvisioner> = match &config.storage_root {
            Some(root) => Arc::new(LocalStorageProvisioner::new(root.clone())),
            None => Arc::new(NoopStorageProvisioner),
        };
        Self::connect_with(config, Arc::new(NoopAuthProvisioner), storage).await
    }

    /// Connects with caller-supplied auth and storage provisioners.
    pub async fn connect_with(
        config: EngineConfig,
        auth: Arc<dyn AuthProvisioner>,
        storage: Arc<dyn StorageProvisioner>,
    ) -> EngineResult<Self> {
        let pool = Pool::new(config.database.clone()).await?;
        let ctx = Arc::new(DbContext::new(&pool, &config.admin_schema)?);

        let validators = Arc::new(ValidatorCache::new());
        let (ttl, negative_ttl) = config.resolution_ttls();
        let resolution_cache = Arc::new(ResolutionCache::new(ttl, negative_ttl));

        let registry = Arc::new(
            TenantRegistry::new(Arc::clone(&ctx)).with_cache(Arc::clone(&resolution_cache)),
        );
        let directory = TenantDirectory::new(
            Arc::clone(&registry),
            &config.env_key,
            Arc::clone(&resolution_cache),
        )?;

        let categories = CategoryCatalog::new(Arc::clone(&ctx));
        let schemas = SchemaStore::new(Arc::clone(&ctx), Arc::clone(&validators));
        let users = UserStore::new(Arc::clone(&ctx));

        let provisioner = TenantProvisioner::new(
            Arc::clone(&registry),
            Arc::new(DbProvisioner::new(Arc::clone(&ctx))),
            auth,
            storage,
        );

        tracing::info!(
            env = %config.env_key,
            admin_schema = %config.admin_schema,
            "engine connected"
        );

        Ok(Self {
            config,
            pool,
            ctx,
            validators,
            resolution_cache,
            registry,
            directory,
            categories,
            schemas,
            users,
            provisioner,
        })
    }

    /// Creates the admin namespace and the shared catalog tables.
    ///
    /// The single bootstrap entry point; idempotent, safe to run on
    /// every start.
    pub async fn bootstrap(&self) -> EngineResult<usize> {
        let manager = MigrationManager::new(&self.pool, &self.config.admin_schema)?;
        manager.init().await?;
        let applied = manager
            .migrate(&admin_migrations(&self.config.admin_schema))
            .await?;
        if applied > 0 {
            tracing::info!(applied, "admin catalog migrated");
        }
        Ok(applied)
    }

    /// Creates and provisions the environment's admin tenant when it
    /// does not exist yet.
    pub async fn bootstrap_admin_tenant(&self) -> EngineResult<TenantRecord> {
        match self.registry.get_by_slug(ADMIN_TENANT_SLUG).await {
            Ok(existing) => return Ok(existing),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let record = TenantRecordBuilder::new()
            .env_key(&self.config.env_key)
            .slug(ADMIN_TENANT_SLUG)
            .display_name("Platform Administration")
            .build()?;
        let record = self.registry.create(&record).await?;
        Ok(self.provisioner.provision(record.tenant_id).await?)
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The tenant registry.
    pub fn tenants(&self) -> &TenantRegistry {
        &self.registry
    }

    /// The schema-category catalog.
    pub fn categories(&self) -> &CategoryCatalog {
        &self.categories
    }

    /// The schema repository.
    pub fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    /// The per-tenant users store.
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// The provisioning orchestrator.
    pub fn provisioner(&self) -> &TenantProvisioner {
        &self.provisioner
    }

    /// The shared validator cache.
    pub fn validators(&self) -> Arc<ValidatorCache> {
        Arc::clone(&self.validators)
    }

    /// An entity repository bound to one schema.
    pub fn entities(&self, schema_id: Uuid) -> EntityRepository {
        EntityRepository::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.validators),
            schema_id,
        )
    }

    /// Resolves an external descriptor or tenant UUID to a tenant space.
    pub async fn resolve_tenant(&self, input: &str) -> EngineResult<TenantSpace> {
        Ok(self.directory.resolve(input).await?)
    }

    /// Runs every provisioner for a tenant and records the outcome.
    pub async fn provision_tenant(&self, tenant_id: Uuid) -> EngineResult<TenantRecord> {
        Ok(self.provisioner.provision(tenant_id).await?)
    }

    /// Non-destructive provisioning check for a tenant.
    pub async fn check_tenant(&self, tenant_id: Uuid) -> EngineResult<ProvisioningReport> {
        Ok(self.provisioner.check(tenant_id).await?)
    }

    /// Paginated tenant listing.
    pub async fn list_tenants(
        &self,
        status: Option<TenantStatus>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRecord>> {
        Ok(self.registry.list_active(status, page).await?)
    }

    /// Database health check.
    pub async fn health(&self) -> EngineResult<HealthStatus> {
        Ok(self.pool.health_check().await?)
    }

    /// Connection pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drops every cached tenant resolution. Intended for tests and
    /// operational tooling.
    pub fn flush_resolution_cache(&self) {
        self.resolution_cache.clear();
    }
}
