//! # Strata Tenant
//!
//! Tenant registry, provisioning, and tenant-space resolution for the
//! Strata multi-tenant document persistence engine.
//!
//! Tenants are immutable version rows in the shared admin catalog; each
//! tenant owns a database namespace and role derived deterministically
//! from the environment key, slug, and tenant id. Provisioners
//! idempotently create the database artifacts, the external auth
//! tenant, and the object-storage prefix, and the tenant only turns
//! `active` when all three are ready.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_db::{DbContext, Pool, PoolConfig};
//! use strata_tenant::{
//!     provisioning::{DbProvisioner, NoopAuthProvisioner, NoopStorageProvisioner, TenantProvisioner},
//!     registry::TenantRegistry,
//!     tenant::TenantRecordBuilder,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(PoolConfig::default()).await?;
//! let ctx = Arc::new(DbContext::new(&pool, "strata_admin")?);
//!
//! let registry = Arc::new(TenantRegistry::new(Arc::clone(&ctx)));
//! let record = TenantRecordBuilder::new()
//!     .env_key("dev")
//!     .slug("acme-co")
//!     .display_name("ACME Co")
//!     .build()?;
//! let record = registry.create(&record).await?;
//!
//! let provisioner = TenantProvisioner::new(
//!     Arc::clone(&registry),
//!     Arc::new(DbProvisioner::new(ctx)),
//!     Arc::new(NoopAuthProvisioner),
//!     Arc::new(NoopStorageProvisioner),
//! );
//! let provisioned = provisioner.provision(record.tenant_id).await?;
//! println!("tenant status: {:?}", provisioned.status);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

/// Error types for tenant operations.
pub mod error;

/// Tenant provisioning and readiness checks.
pub mod provisioning;

/// Tenant registry store.
pub mod registry;

/// Tenant-space resolution with TTL caching.
pub mod resolve;

/// Tenant records and the tenant-space handle.
pub mod tenant;

// Re-export commonly used types
pub use error::{TenantError, TenantResult};
pub use provisioning::{
    AuthProvisioner, DbProvisioner, LocalStorageProvisioner, NoopAuthProvisioner,
    NoopStorageProvisioner, ProvisioningReport, Readiness, StorageProvisioner, TenantProvisioner,
};
pub use registry::TenantRegistry;
pub use resolve::{ResolutionCache, TenantDirectory};
pub use tenant::{
    ReadinessFlags, TenantRecord, TenantRecordBuilder, TenantSpace, TenantStatus,
};
