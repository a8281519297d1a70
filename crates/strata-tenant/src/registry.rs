//! Tenant registry store over the admin database context.
//!
//! All writes are transactional. The `is_active` marker moves between
//! version rows inside the same transaction that inserts the new row,
//! with the previous row locked `FOR UPDATE`, so at every observable
//! time exactly one row per tenant is active.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use strata_core::{Page, PageRequest, SemanticVersion};
use strata_db::{DbContext, DbError};
use uuid::Uuid;

use crate::error::{TenantError, TenantResult};
use crate::resolve::ResolutionCache;
use crate::tenant::{ReadinessFlags, TenantRecord, TenantStatus};

const TENANT_COLUMNS: &str = "tenant_id, tenant_version_major, tenant_version_minor, \
     tenant_version_patch, slug, display_name, status, schema_name, role_name, \
     short_tenant_id, base_prefix, db_ready, auth_ready, storage_ready, \
     last_provisioned_at, last_error, is_active, is_soft_deleted, created_at, created_by";

/// Persistent store for tenant version rows.
pub struct TenantRegistry {
    ctx: Arc<DbContext>,
    cache: Option<Arc<ResolutionCache>>,
}

impl TenantRegistry {
    /// Creates a registry over the admin context.
    pub fn new(ctx: Arc<DbContext>) -> Self {
        Self { ctx, cache: None }
    }

    /// Attaches the resolution cache so registry writes invalidate it.
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Inserts the first version row of a new tenant.
    ///
    /// Fails with a slug conflict when another tenant with the same slug
    /// is active; under concurrent creates the partial unique index is
    /// the arbiter and the loser surfaces the same conflict.
    pub async fn create(&self, record: &TenantRecord) -> TenantResult<TenantRecord> {
        let record = record.clone();
        let created = self
            .ctx
            .with_admin::<TenantRecord, TenantError, _>(move |conn| {
                Box::pin(async move {
                    let taken: Option<(Uuid,)> = sqlx::query_as(
                        "SELECT tenant_id FROM tenants \
                         WHERE slug = $1 AND is_active AND NOT is_soft_deleted",
                    )
                    .bind(&record.slug)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    if taken.is_some() {
                        return Err(TenantError::SlugConflict(record.slug.clone()));
                    }

                    insert_row(conn, &record)
                        .await
                        .map_err(|e| conflict_on_slug(e, &record.slug))?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(tenant = %created.slug, id = %created.tenant_id, "tenant created");
        self.invalidate(&created);
        Ok(created)
    }

    /// Returns the active, non-soft-deleted row for a tenant id.
    pub async fn get_active(&self, tenant_id: Uuid) -> TenantResult<TenantRecord> {
        self.ctx
            .with_admin::<TenantRecord, TenantError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM tenants \
                         WHERE tenant_id = $1 AND is_active AND NOT is_soft_deleted",
                        TENANT_COLUMNS
                    ))
                    .bind(tenant_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_record(&row),
                        None => Err(TenantError::NotFound(tenant_id.to_string())),
                    }
                })
            })
            .await
    }

    /// Returns the active, non-soft-deleted row for a slug.
    pub async fn get_by_slug(&self, slug: &str) -> TenantResult<TenantRecord> {
        let slug = slug.to_string();
        self.ctx
            .with_admin::<TenantRecord, TenantError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM tenants \
                         WHERE slug = $1 AND is_active AND NOT is_soft_deleted",
                        TENANT_COLUMNS
                    ))
                    .bind(slug.as_str())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_record(&row),
                        None => Err(TenantError::NotFound(slug)),
                    }
                })
            })
            .await
    }

    /// Writes a new version row, atomically transferring `is_active`
    /// from the previous version.
    ///
    /// The stored version is the previous version's next patch unless
    /// the caller explicitly bumped past it.
    pub async fn append_version(&self, record: &TenantRecord) -> TenantResult<TenantRecord> {
        let record = record.clone();
        let stored = self
            .ctx
            .with_admin::<TenantRecord, TenantError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM tenants \
                         WHERE tenant_id = $1 AND is_active AND NOT is_soft_deleted \
                         FOR UPDATE",
                        TENANT_COLUMNS
                    ))
                    .bind(record.tenant_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let current = match row {
                        Some(row) => row_to_record(&row)?,
                        None => return Err(TenantError::NotFound(record.tenant_id.to_string())),
                    };

                    sqlx::query(
                        "UPDATE tenants SET is_active = FALSE \
                         WHERE tenant_id = $1 AND is_active",
                    )
                    .bind(record.tenant_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let mut next = record;
                    next.tenant_version =
                        resolve_append_version(current.tenant_version, next.tenant_version);
                    next.is_active = true;
                    // derived names never change after first creation
                    next.schema_name = current.schema_name;
                    next.role_name = current.role_name;
                    next.short_tenant_id = current.short_tenant_id;
                    next.base_prefix = current.base_prefix;

                    insert_row(conn, &next)
                        .await
                        .map_err(|e| conflict_on_slug(e, &next.slug))?;
                    Ok(next)
                })
            })
            .await?;

        tracing::debug!(
            tenant = %stored.slug,
            version = %stored.tenant_version,
            "tenant version appended"
        );
        self.invalidate(&stored);
        Ok(stored)
    }

    /// Records a provisioning outcome as a new version row.
    pub async fn update_provisioning(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
        readiness: ReadinessFlags,
        last_error: Option<String>,
    ) -> TenantResult<TenantRecord> {
        let current = self.get_active(tenant_id).await?;
        let next = current
            .next_version()
            .with_status(status)
            .with_readiness(readiness)
            .with_provisioning_outcome(chrono::Utc::now(), last_error);
        self.append_version(&next).await
    }

    /// Paginated list of active rows, ordered by creation time with the
    /// tenant id as tiebreaker.
    pub async fn list_active(
        &self,
        status: Option<TenantStatus>,
        page: PageRequest,
    ) -> TenantResult<Page<TenantRecord>> {
        self.ctx
            .with_admin::<Page<TenantRecord>, TenantError, _>(move |conn| {
                Box::pin(async move {
                    let filter = match status {
                        Some(_) => "AND status = $1",
                        None => "",
                    };

                    let count_sql = format!(
                        "SELECT COUNT(*) FROM tenants \
                         WHERE is_active AND NOT is_soft_deleted {}",
                        filter
                    );
                    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
                    if let Some(status) = status {
                        count_query = count_query.bind(status.as_str());
                    }
                    let total: i64 = count_query
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(DbError::from)?;

                    let list_sql = format!(
                        "SELECT {} FROM tenants \
                         WHERE is_active AND NOT is_soft_deleted {} \
                         ORDER BY created_at ASC, tenant_id ASC \
                         LIMIT {} OFFSET {}",
                        TENANT_COLUMNS,
                        filter,
                        page.limit(),
                        page.offset()
                    );
                    let mut list_query = sqlx::query(&list_sql);
                    if let Some(status) = status {
                        list_query = list_query.bind(status.as_str());
                    }
                    let rows = list_query
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(DbError::from)?;

                    let items = rows
                        .iter()
                        .map(row_to_record)
                        .collect::<TenantResult<Vec<_>>>()?;

                    Ok(Page::new(items, total as u64, page))
                })
            })
            .await
    }

    fn invalidate(&self, record: &TenantRecord) {
        if let Some(cache) = &self.cache {
            cache.invalidate_tenant(&record.tenant_id, &record.slug);
        }
    }
}

/// Version stored by `append_version`: the caller's explicit bump when
/// it moves past the current version, the next patch otherwise.
pub(crate) fn resolve_append_version(
    current: SemanticVersion,
    requested: SemanticVersion,
) -> SemanticVersion {
    if requested > current {
        requested
    } else {
        current.next_patch()
    }
}

async fn insert_row(conn: &mut PgConnection, record: &TenantRecord) -> TenantResult<()> {
    let (major, minor, patch) = record.tenant_version.as_columns();

    sqlx::query(
        "INSERT INTO tenants (tenant_id, tenant_version_major, tenant_version_minor, \
         tenant_version_patch, slug, display_name, status, schema_name, role_name, \
         short_tenant_id, base_prefix, db_ready, auth_ready, storage_ready, \
         last_provisioned_at, last_error, is_active, is_soft_deleted, created_at, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
         $17, $18, $19, $20)",
    )
    .bind(record.tenant_id)
    .bind(major)
    .bind(minor)
    .bind(patch)
    .bind(&record.slug)
    .bind(&record.display_name)
    .bind(record.status.as_str())
    .bind(&record.schema_name)
    .bind(&record.role_name)
    .bind(&record.short_tenant_id)
    .bind(&record.base_prefix)
    .bind(record.readiness.db_ready)
    .bind(record.readiness.auth_ready)
    .bind(record.readiness.storage_ready)
    .bind(record.last_provisioned_at)
    .bind(&record.last_error)
    .bind(record.is_active)
    .bind(record.is_soft_deleted)
    .bind(record.created_at)
    .bind(record.created_by)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

fn row_to_record(row: &PgRow) -> TenantResult<TenantRecord> {
    let version = SemanticVersion::from_columns(
        row.try_get("tenant_version_major").map_err(DbError::from)?,
        row.try_get("tenant_version_minor").map_err(DbError::from)?,
        row.try_get("tenant_version_patch").map_err(DbError::from)?,
    )
    .map_err(|e| TenantError::Internal(e.to_string()))?;

    let status: String = row.try_get("status").map_err(DbError::from)?;

    Ok(TenantRecord {
        tenant_id: row.try_get("tenant_id").map_err(DbError::from)?,
        tenant_version: version,
        slug: row.try_get("slug").map_err(DbError::from)?,
        display_name: row.try_get("display_name").map_err(DbError::from)?,
        status: TenantStatus::parse(&status)?,
        schema_name: row.try_get("schema_name").map_err(DbError::from)?,
        role_name: row.try_get("role_name").map_err(DbError::from)?,
        short_tenant_id: row.try_get("short_tenant_id").map_err(DbError::from)?,
        base_prefix: row.try_get("base_prefix").map_err(DbError::from)?,
        readiness: ReadinessFlags {
            db_ready: row.try_get("db_ready").map_err(DbError::from)?,
            auth_ready: row.try_get("auth_ready").map_err(DbError::from)?,
            storage_ready: row.try_get("storage_ready").map_err(DbError::from)?,
        },
        last_provisioned_at: row.try_get("last_provisioned_at").map_err(DbError::from)?,
        last_error: row.try_get("last_error").map_err(DbError::from)?,
        is_active: row.try_get("is_active").map_err(DbError::from)?,
        is_soft_deleted: row.try_get("is_soft_deleted").map_err(DbError::from)?,
        created_at: row.try_get("created_at").map_err(DbError::from)?,
        created_by: row.try_get("created_by").map_err(DbError::from)?,
    })
}

fn conflict_on_slug(err: TenantError, slug: &str) -> TenantError {
    if err.is_conflict() {
        TenantError::SlugConflict(slug.to_string())
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_append_version_defaults_to_next_patch() {
        let current = SemanticVersion::new(1, 0, 3);
        assert_eq!(
            resolve_append_version(current, current),
            SemanticVersion::new(1, 0, 4)
        );
        assert_eq!(
            resolve_append_version(current, SemanticVersion::new(1, 0, 1)),
            SemanticVersion::new(1, 0, 4)
        );
    }

    #[test]
    fn test_resolve_append_version_honors_explicit_bumps() {
        let current = SemanticVersion::new(1, 0, 3);
        assert_eq!(
            resolve_append_version(current, current.next_minor()),
            SemanticVersion::new(1, 1, 0)
        );
        assert_eq!(
            resolve_append_version(current, current.next_major()),
            SemanticVersion::new(2, 0, 0)
        );
    }

    #[test]
    fn test_conflict_mapping_preserves_other_errors() {
        let conflict = conflict_on_slug(
            TenantError::Db(DbError::UniqueViolation("tenants_active_slug_idx".into())),
            "acme",
        );
        assert!(matches!(conflict, TenantError::SlugConflict(s) if s == "acme"));

        let other = conflict_on_slug(TenantError::Internal("boom".into()), "acme");
        assert!(matches!(other, TenantError::Internal(_)));
    }
}
