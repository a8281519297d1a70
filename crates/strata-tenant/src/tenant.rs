//! Tenant records and the resolved tenant-space handle.
//!
//! Tenant rows are immutable: every change writes a new version row and
//! atomically moves the `is_active` marker. The names derived at first
//! creation (namespace, role, short id, storage prefix) are copied
//! forward unchanged for the life of the tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{ident, SemanticVersion};
use strata_db::TenantScope;
use uuid::Uuid;
use validator::Validate;

use crate::error::{TenantError, TenantResult};

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Created, provisioning not yet started
    Pending,
    /// One or more provisioners are not ready
    Provisioning,
    /// All provisioners ready, tenant operational
    Active,
    /// Temporarily blocked from operations
    Suspended,
    /// Permanently decommissioned
    Retired,
}

impl TenantStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Retired => "retired",
        }
    }

    /// Parses the storage representation.
    pub fn parse(raw: &str) -> TenantResult<Self> {
        match raw {
            "pending" => Ok(TenantStatus::Pending),
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "retired" => Ok(TenantStatus::Retired),
            other => Err(TenantError::Internal(format!(
                "unknown tenant status '{}'",
                other
            ))),
        }
    }
}

lazy_static::lazy_static! {
    static ref SLUG_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
}

/// Provisioning readiness flags carried on every tenant row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlags {
    /// Database role, namespace, grants, and base tables exist
    pub db_ready: bool,
    /// External auth tenant exists
    pub auth_ready: bool,
    /// Object-storage prefix exists
    pub storage_ready: bool,
}

impl ReadinessFlags {
    /// True when every provisioner has reported ready.
    pub fn all_ready(&self) -> bool {
        self.db_ready && self.auth_ready && self.storage_ready
    }
}

/// One immutable version row of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TenantRecord {
    /// Stable tenant identifier
    pub tenant_id: Uuid,

    /// Version of this row; bumped on every change
    pub tenant_version: SemanticVersion,

    /// Human-facing tenant slug (e.g., "acme-co")
    #[validate(length(min = 1, max = 63))]
    #[validate(regex = "SLUG_REGEX")]
    pub slug: String,

    /// Optional display name
    pub display_name: Option<String>,

    /// Lifecycle status
    pub status: TenantStatus,

    /// Tenant database namespace; fixed at first creation
    pub schema_name: String,

    /// Tenant database role; fixed at first creation
    pub role_name: String,

    /// First 8 hex characters of the tenant UUID; fixed at first creation
    pub short_tenant_id: String,

    /// Object-storage prefix; fixed at first creation
    pub base_prefix: String,

    /// Provisioning readiness flags
    pub readiness: ReadinessFlags,

    /// When provisioning last ran
    pub last_provisioned_at: Option<DateTime<Utc>>,

    /// Last provisioning failure, if any
    pub last_error: Option<String>,

    /// Exactly one row per tenant carries this marker
    pub is_active: bool,

    /// Logical deletion marker
    pub is_soft_deleted: bool,

    /// When this version row was written
    pub created_at: DateTime<Utc>,

    /// Caller that wrote this version row
    pub created_by: Option<Uuid>,
}

impl TenantRecord {
    /// Checks the tenant may serve requests.
    pub fn validate_operational(&self) -> TenantResult<()> {
        match self.status {
            TenantStatus::Active => Ok(()),
            TenantStatus::Pending | TenantStatus::Provisioning => Err(TenantError::Precondition(
                format!("tenant {} is still provisioning", self.slug),
            )),
            TenantStatus::Suspended => Err(TenantError::Precondition(format!(
                "tenant {} is suspended",
                self.slug
            ))),
            TenantStatus::Retired => Err(TenantError::Precondition(format!(
                "tenant {} is retired",
                self.slug
            ))),
        }
    }

    /// The resolved handle passed to the database context manager.
    pub fn space(&self) -> TenantSpace {
        TenantSpace {
            tenant_id: self.tenant_id,
            slug: self.slug.clone(),
            schema_name: self.schema_name.clone(),
            role_name: self.role_name.clone(),
            short_tenant_id: self.short_tenant_id.clone(),
            base_prefix: self.base_prefix.clone(),
        }
    }

    /// Clones this row into the next version, carrying the derived
    /// names forward unchanged. The caller mutates the clone and hands
    /// it to the registry's `append_version`.
    pub fn next_version(&self) -> TenantRecord {
        let mut next = self.clone();
        next.tenant_version = self.tenant_version.next_patch();
        next.is_active = true;
        next.created_at = Utc::now();
        next
    }

    /// Copy with a different status.
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    /// Copy with new readiness flags.
    pub fn with_readiness(mut self, readiness: ReadinessFlags) -> Self {
        self.readiness = readiness;
        self
    }

    /// Copy with a provisioning outcome recorded.
    pub fn with_provisioning_outcome(
        mut self,
        at: DateTime<Utc>,
        error: Option<String>,
    ) -> Self {
        self.last_provisioned_at = Some(at);
        self.last_error = error;
        self
    }
}

/// The resolved tenant-space handle injected into request-scoped work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSpace {
    /// Stable tenant identifier
    pub tenant_id: Uuid,
    /// Tenant slug
    pub slug: String,
    /// Tenant database namespace
    pub schema_name: String,
    /// Tenant database role
    pub role_name: String,
    /// Short tenant identifier
    pub short_tenant_id: String,
    /// Object-storage prefix
    pub base_prefix: String,
}

impl TenantSpace {
    /// The role/namespace pair handed to `DbContext::with_tenant`.
    pub fn scope(&self) -> TenantResult<TenantScope> {
        Ok(TenantScope::new(&self.schema_name, &self.role_name)?)
    }

    /// External descriptor for this tenant in the given environment.
    pub fn external_descriptor(&self, env_key: &str) -> String {
        ident::external_tenant_descriptor(env_key, &self.slug)
    }
}

/// Builder for the first version row of a new tenant.
#[derive(Debug, Default)]
pub struct TenantRecordBuilder {
    env_key: Option<String>,
    slug: Option<String>,
    display_name: Option<String>,
    created_by: Option<Uuid>,
    tenant_id: Option<Uuid>,
}

impl TenantRecordBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment key (e.g., "dev").
    pub fn env_key(mut self, env_key: impl Into<String>) -> Self {
        self.env_key = Some(env_key.into());
        self
    }

    /// Sets the tenant slug.
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Records the creating principal.
    pub fn created_by(mut self, user_id: Uuid) -> Self {
        self.created_by = Some(user_id);
        self
    }

    /// Overrides the generated tenant id. Used by bootstrap tooling to
    /// make the admin tenant id deterministic.
    pub fn tenant_id(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Derives all fixed names and builds the first version row.
    pub fn build(self) -> TenantResult<TenantRecord> {
        let env_key = self
            .env_key
            .ok_or_else(|| TenantError::Validation(field_required("env_key")))?;
        let slug = self
            .slug
            .ok_or_else(|| TenantError::Validation(field_required("slug")))?;

        let tenant_id = self.tenant_id.unwrap_or_else(Uuid::new_v4);

        let schema_name = ident::build_schema_name(&env_key, &slug)?;
        let role_name = ident::build_role_name(&schema_name);
        let short_tenant_id = ident::build_short_tenant_id(&tenant_id);
        let base_prefix = ident::build_base_prefix(&env_key, &slug, &short_tenant_id);

        let record = TenantRecord {
            tenant_id,
            tenant_version: SemanticVersion::FIRST,
            slug,
            display_name: self.display_name,
            status: TenantStatus::Pending,
            schema_name,
            role_name,
            short_tenant_id,
            base_prefix,
            readiness: ReadinessFlags::default(),
            last_provisioned_at: None,
            last_error: None,
            is_active: true,
            is_soft_deleted: false,
            created_at: Utc::now(),
            created_by: self.created_by,
        };

        record.validate()?;
        Ok(record)
    }
}

fn field_required(field: &str) -> strata_core::FieldErrors {
    strata_core::FieldErrors::single(field, "is required")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tenant(slug: &str) -> TenantRecord {
        TenantRecordBuilder::new()
            .env_key("dev")
            .slug(slug)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_derives_fixed_names() {
        let record = build_tenant("admin");
        assert_eq!(record.schema_name, "dev_admin");
        assert_eq!(record.role_name, "dev_admin_role");
        assert_eq!(record.short_tenant_id.len(), 8);
        assert_eq!(
            record.base_prefix,
            format!("dev/admin-{}/", record.short_tenant_id)
        );
        assert_eq!(record.tenant_version, SemanticVersion::FIRST);
        assert_eq!(record.status, TenantStatus::Pending);
        assert!(record.is_active);
    }

    #[test]
    fn test_builder_rejects_bad_slug() {
        let result = TenantRecordBuilder::new()
            .env_key("dev")
            .slug("Not A Slug")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_env_key_and_slug() {
        assert!(TenantRecordBuilder::new().slug("acme").build().is_err());
        assert!(TenantRecordBuilder::new().env_key("dev").build().is_err());
    }

    #[test]
    fn test_next_version_copies_derived_names() {
        let record = build_tenant("acme-co");
        let next = record.next_version().with_status(TenantStatus::Active);

        assert_eq!(next.tenant_version, SemanticVersion::new(1, 0, 1));
        assert_eq!(next.schema_name, record.schema_name);
        assert_eq!(next.role_name, record.role_name);
        assert_eq!(next.short_tenant_id, record.short_tenant_id);
        assert_eq!(next.base_prefix, record.base_prefix);
        assert_eq!(next.tenant_id, record.tenant_id);
    }

    #[test]
    fn test_validate_operational() {
        let record = build_tenant("acme-co");
        assert!(record.validate_operational().is_err());

        let active = record.with_status(TenantStatus::Active);
        assert!(active.validate_operational().is_ok());

        let suspended = active.with_status(TenantStatus::Suspended);
        assert!(suspended.validate_operational().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TenantStatus::Pending,
            TenantStatus::Provisioning,
            TenantStatus::Active,
            TenantStatus::Suspended,
            TenantStatus::Retired,
        ] {
            assert_eq!(TenantStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TenantStatus::parse("zombie").is_err());
    }

    #[test]
    fn test_space_and_scope() {
        let record = build_tenant("acme-co").with_status(TenantStatus::Active);
        let space = record.space();
        assert_eq!(space.schema_name, "dev_acme_co");

        let scope = space.scope().unwrap();
        assert_eq!(scope.role_name, "dev_acme_co_role");
        assert_eq!(space.external_descriptor("dev"), "dev-acme-co");
    }

    #[test]
    fn test_readiness_flags() {
        let mut flags = ReadinessFlags::default();
        assert!(!flags.all_ready());
        flags.db_ready = true;
        flags.auth_ready = true;
        flags.storage_ready = true;
        assert!(flags.all_ready());
    }
}
