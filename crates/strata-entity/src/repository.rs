//! Entity repository with schema-validated CRUD and append-style
//! versioning.
//!
//! Every operation runs inside a tenant-scoped transaction. Updates and
//! deletes lock the current active row `FOR UPDATE` before computing
//! the next version, so concurrent writers to the same entity are
//! linearized by the database; payloads are validated against the
//! active schema version before anything is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use strata_core::{Page, SemanticVersion};
use strata_db::{quote_identifier, DbContext, DbError, TenantScope};
use strata_schema::repository::active_by_schema_id;
use strata_schema::{SchemaVersionRecord, ValidatorCache};
use strata_tenant::TenantSpace;
use uuid::Uuid;

use crate::error::{EntityError, EntityResult};
use crate::model::{EntityRecord, ListParams, NewEntity};

const ENTITY_COLUMNS: &str = "entity_id, entity_version_major, entity_version_minor, \
     entity_version_patch, schema_id, schema_version_major, schema_version_minor, \
     schema_version_patch, payload, created_at, created_by, is_active, is_soft_deleted";

/// Repository over one schema's entity documents in a tenant namespace.
///
/// Bound to a `schemaId` at construction; the active schema version is
/// resolved inside each operation's transaction.
pub struct EntityRepository {
    ctx: Arc<DbContext>,
    validators: Arc<ValidatorCache>,
    schema_id: Uuid,
}

impl EntityRepository {
    /// Creates a repository for one schema.
    pub fn new(ctx: Arc<DbContext>, validators: Arc<ValidatorCache>, schema_id: Uuid) -> Self {
        Self {
            ctx,
            validators,
            schema_id,
        }
    }

    /// The schema this repository is bound to.
    pub fn schema_id(&self) -> Uuid {
        self.schema_id
    }

    /// Creates an entity at version `1.0.0`, validating the payload
    /// against the active schema version.
    pub async fn create(&self, space: &TenantSpace, new: &NewEntity) -> EntityResult<EntityRecord> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;
        let validators = Arc::clone(&self.validators);
        let admin_schema = self.ctx.admin_schema().to_string();
        let new = new.clone();

        let record = self
            .ctx
            .with_tenant::<EntityRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    validators.validate(
                        schema.schema_id,
                        schema.schema_version,
                        &schema.schema_definition,
                        &new.payload,
                    )?;

                    ensure_entity_table(conn, &schema.table_name, &admin_schema).await?;
                    let table = quote_identifier(&schema.table_name);

                    let entity_id = new.entity_id.unwrap_or_else(Uuid::new_v4);

                    let existing: Option<(Uuid,)> = sqlx::query_as(&format!(
                        "SELECT entity_id FROM {} WHERE entity_id = $1 AND is_active",
                        table
                    ))
                    .bind(entity_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
                    if existing.is_some() {
                        return Err(EntityError::AlreadyExists(entity_id.to_string()));
                    }

                    let record = EntityRecord {
                        entity_id,
                        entity_version: SemanticVersion::FIRST,
                        schema_id: schema.schema_id,
                        schema_version: schema.schema_version,
                        payload: new.payload,
                        created_at: Utc::now(),
                        created_by: new.created_by,
                        is_active: true,
                        is_soft_deleted: false,
                    };

                    insert_row(conn, &schema.table_name, &record)
                        .await
                        .map_err(|e| conflict_on_entity(e, entity_id))?;
                    Ok(record)
                })
            })
            .await?;

        tracing::debug!(
            entity = %record.entity_id,
            schema = %record.schema_id,
            tenant = %space.slug,
            "entity created"
        );
        Ok(record)
    }

    /// Writes a new version row for an entity, flipping the previous
    /// active row inside the same transaction.
    pub async fn update(
        &self,
        space: &TenantSpace,
        entity_id: Uuid,
        payload: serde_json::Value,
        created_by: Option<Uuid>,
    ) -> EntityResult<EntityRecord> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;
        let validators = Arc::clone(&self.validators);

        let record = self
            .ctx
            .with_tenant::<EntityRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    validators.validate(
                        schema.schema_id,
                        schema.schema_version,
                        &schema.schema_definition,
                        &payload,
                    )?;

                    let current = lock_active_row(conn, &schema, entity_id).await?;

                    deactivate_row(conn, &schema.table_name, &current).await?;

                    let record = EntityRecord {
                        entity_id,
                        entity_version: current.entity_version.next_patch(),
                        schema_id: schema.schema_id,
                        schema_version: schema.schema_version,
                        payload,
                        created_at: Utc::now(),
                        created_by,
                        is_active: true,
                        is_soft_deleted: false,
                    };

                    insert_row(conn, &schema.table_name, &record).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::debug!(
            entity = %record.entity_id,
            version = %record.entity_version,
            tenant = %space.slug,
            "entity updated"
        );
        Ok(record)
    }

    /// Returns the current active, non-tombstoned row.
    pub async fn get_by_id(
        &self,
        space: &TenantSpace,
        entity_id: Uuid,
    ) -> EntityResult<EntityRecord> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;

        self.ctx
            .with_tenant::<EntityRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    let table = quote_identifier(&schema.table_name);

                    let row = sqlx::query(&format!(
                        "SELECT {} FROM {} \
                         WHERE entity_id = $1 AND is_active AND NOT is_soft_deleted",
                        ENTITY_COLUMNS, table
                    ))
                    .bind(entity_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_entity(&row),
                        None => Err(EntityError::NotFound(entity_id.to_string())),
                    }
                })
            })
            .await
    }

    /// Paginated listing with sanitized sort, plus total count.
    pub async fn list(
        &self,
        space: &TenantSpace,
        params: &ListParams,
    ) -> EntityResult<Page<EntityRecord>> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;
        let params = params.clone();

        self.ctx
            .with_tenant::<Page<EntityRecord>, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    let table = quote_identifier(&schema.table_name);

                    let total: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM {} {}",
                        table,
                        params.where_clause()
                    ))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let rows = sqlx::query(&format!(
                        "SELECT {} FROM {} {} {} LIMIT {} OFFSET {}",
                        ENTITY_COLUMNS,
                        table,
                        params.where_clause(),
                        params.order_clause(),
                        params.page.limit(),
                        params.page.offset()
                    ))
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let items = rows
                        .iter()
                        .map(row_to_entity)
                        .collect::<EntityResult<Vec<_>>>()?;
                    Ok(Page::new(items, total as u64, params.page))
                })
            })
            .await
    }

    /// Count with the same filters as `list`.
    pub async fn count(&self, space: &TenantSpace, params: &ListParams) -> EntityResult<u64> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;
        let params = params.clone();

        self.ctx
            .with_tenant::<u64, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    let table = quote_identifier(&schema.table_name);

                    let total: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM {} {}",
                        table,
                        params.where_clause()
                    ))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    Ok(total as u64)
                })
            })
            .await
    }

    /// Logical delete: inserts a terminal tombstone row at the next
    /// patch version and flips the previous row, atomically. Subsequent
    /// updates and deletes see the tombstone and report not-found.
    pub async fn delete(
        &self,
        space: &TenantSpace,
        entity_id: Uuid,
        at: DateTime<Utc>,
    ) -> EntityResult<EntityRecord> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;

        let tombstone = self
            .ctx
            .with_tenant::<EntityRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    let current = lock_active_row(conn, &schema, entity_id).await?;

                    deactivate_row(conn, &schema.table_name, &current).await?;

                    let tombstone = EntityRecord {
                        entity_id,
                        entity_version: current.entity_version.next_patch(),
                        schema_id: current.schema_id,
                        schema_version: current.schema_version,
                        payload: current.payload.clone(),
                        created_at: at,
                        created_by: current.created_by,
                        is_active: true,
                        is_soft_deleted: true,
                    };

                    insert_row(conn, &schema.table_name, &tombstone).await?;
                    Ok(tombstone)
                })
            })
            .await?;

        tracing::debug!(
            entity = %tombstone.entity_id,
            tenant = %space.slug,
            "entity deleted"
        );
        Ok(tombstone)
    }

    /// Every version row of an entity, oldest first.
    pub async fn history(
        &self,
        space: &TenantSpace,
        entity_id: Uuid,
    ) -> EntityResult<Vec<EntityRecord>> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let schema_id = self.schema_id;

        self.ctx
            .with_tenant::<Vec<EntityRecord>, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let schema = active_by_schema_id(conn, schema_id).await?;
                    let table = quote_identifier(&schema.table_name);

                    let rows = sqlx::query(&format!(
                        "SELECT {} FROM {} WHERE entity_id = $1 \
                         ORDER BY entity_version_major ASC, entity_version_minor ASC, \
                         entity_version_patch ASC",
                        ENTITY_COLUMNS, table
                    ))
                    .bind(entity_id)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    if rows.is_empty() {
                        return Err(EntityError::NotFound(entity_id.to_string()));
                    }
                    rows.iter().map(row_to_entity).collect()
                })
            })
            .await
    }
}

/// Creates the per-schema entity table on first use, owned by the
/// tenant role executing the transaction.
pub(crate) async fn ensure_entity_table(
    conn: &mut PgConnection,
    table_name: &str,
    admin_schema: &str,
) -> EntityResult<()> {
    sqlx::query(&entity_table_ddl(table_name, admin_schema))
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

    sqlx::query(&entity_table_index_ddl(table_name))
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

    Ok(())
}

/// DDL for an entity table. The foreign key into the shared catalog is
/// why tenant roles get `REFERENCES` on the schema repository.
pub(crate) fn entity_table_ddl(table_name: &str, admin_schema: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            entity_id UUID NOT NULL,
            entity_version_major INTEGER NOT NULL,
            entity_version_minor INTEGER NOT NULL,
            entity_version_patch INTEGER NOT NULL,
            schema_id UUID NOT NULL,
            schema_version_major INTEGER NOT NULL,
            schema_version_minor INTEGER NOT NULL,
            schema_version_patch INTEGER NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            created_by UUID,
            is_active BOOLEAN NOT NULL,
            is_soft_deleted BOOLEAN NOT NULL DEFAULT FALSE,
            PRIMARY KEY (entity_id, entity_version_major, entity_version_minor, entity_version_patch),
            FOREIGN KEY (schema_id, schema_version_major, schema_version_minor, schema_version_patch)
                REFERENCES {admin}.schema_repository
                (schema_id, schema_version_major, schema_version_minor, schema_version_patch)
        )
        "#,
        table = quote_identifier(table_name),
        admin = quote_identifier(admin_schema)
    )
}

/// Partial unique index backing the one-active-row invariant.
pub(crate) fn entity_table_index_ddl(table_name: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} (entity_id) WHERE is_active",
        quote_identifier(&format!("{}_active_idx", table_name)),
        quote_identifier(table_name)
    )
}

/// Locks the current active row of an entity; a tombstoned row is
/// terminal and reads as absent.
async fn lock_active_row(
    conn: &mut PgConnection,
    schema: &SchemaVersionRecord,
    entity_id: Uuid,
) -> EntityResult<EntityRecord> {
    let table = quote_identifier(&schema.table_name);

    let row = sqlx::query(&format!(
        "SELECT {} FROM {} WHERE entity_id = $1 AND is_active FOR UPDATE",
        ENTITY_COLUMNS, table
    ))
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let current = match row {
        Some(row) => row_to_entity(&row)?,
        None => return Err(EntityError::NotFound(entity_id.to_string())),
    };

    if current.is_soft_deleted {
        return Err(EntityError::NotFound(entity_id.to_string()));
    }
    Ok(current)
}

async fn deactivate_row(
    conn: &mut PgConnection,
    table_name: &str,
    row: &EntityRecord,
) -> EntityResult<()> {
    let (major, minor, patch) = row.entity_version.as_columns();
    sqlx::query(&format!(
        "UPDATE {} SET is_active = FALSE \
         WHERE entity_id = $1 AND entity_version_major = $2 \
         AND entity_version_minor = $3 AND entity_version_patch = $4",
        quote_identifier(table_name)
    ))
    .bind(row.entity_id)
    .bind(major)
    .bind(minor)
    .bind(patch)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;
    Ok(())
}

async fn insert_row(
    conn: &mut PgConnection,
    table_name: &str,
    record: &EntityRecord,
) -> EntityResult<()> {
    let (entity_major, entity_minor, entity_patch) = record.entity_version.as_columns();
    let (schema_major, schema_minor, schema_patch) = record.schema_version.as_columns();

    sqlx::query(&format!(
        "INSERT INTO {} (entity_id, entity_version_major, entity_version_minor, \
         entity_version_patch, schema_id, schema_version_major, schema_version_minor, \
         schema_version_patch, payload, created_at, created_by, is_active, is_soft_deleted) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        quote_identifier(table_name)
    ))
    .bind(record.entity_id)
    .bind(entity_major)
    .bind(entity_minor)
    .bind(entity_patch)
    .bind(record.schema_id)
    .bind(schema_major)
    .bind(schema_minor)
    .bind(schema_patch)
    .bind(&record.payload)
    .bind(record.created_at)
    .bind(record.created_by)
    .bind(record.is_active)
    .bind(record.is_soft_deleted)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

fn row_to_entity(row: &PgRow) -> EntityResult<EntityRecord> {
    let entity_version = SemanticVersion::from_columns(
        row.try_get("entity_version_major").map_err(DbError::from)?,
        row.try_get("entity_version_minor").map_err(DbError::from)?,
        row.try_get("entity_version_patch").map_err(DbError::from)?,
    )
    .map_err(|e| EntityError::Internal(e.to_string()))?;

    let schema_version = SemanticVersion::from_columns(
        row.try_get("schema_version_major").map_err(DbError::from)?,
        row.try_get("schema_version_minor").map_err(DbError::from)?,
        row.try_get("schema_version_patch").map_err(DbError::from)?,
    )
    .map_err(|e| EntityError::Internal(e.to_string()))?;

    Ok(EntityRecord {
        entity_id: row.try_get("entity_id").map_err(DbError::from)?,
        entity_version,
        schema_id: row.try_get("schema_id").map_err(DbError::from)?,
        schema_version,
        payload: row.try_get("payload").map_err(DbError::from)?,
        created_at: row.try_get("created_at").map_err(DbError::from)?,
        created_by: row.try_get("created_by").map_err(DbError::from)?,
        is_active: row.try_get("is_active").map_err(DbError::from)?,
        is_soft_deleted: row.try_get("is_soft_deleted").map_err(DbError::from)?,
    })
}

fn conflict_on_entity(err: EntityError, entity_id: Uuid) -> EntityError {
    if err.is_conflict() {
        EntityError::AlreadyExists(entity_id.to_string())
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_table_ddl_shape() {
        let ddl = entity_table_ddl("cards_entities", "strata_admin");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"cards_entities\""));
        assert!(ddl.contains(
            "PRIMARY KEY (entity_id, entity_version_major, entity_version_minor, entity_version_patch)"
        ));
        assert!(ddl.contains("REFERENCES \"strata_admin\".schema_repository"));
        assert!(ddl.contains("payload JSONB NOT NULL"));
    }

    #[test]
    fn test_entity_table_index_backs_single_active_invariant() {
        let ddl = entity_table_index_ddl("cards_entities");
        assert_eq!(
            ddl,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"cards_entities_active_idx\" \
             ON \"cards_entities\" (entity_id) WHERE is_active"
        );
    }

    #[test]
    fn test_conflict_mapping() {
        let err = conflict_on_entity(
            EntityError::Db(DbError::UniqueViolation("cards_entities_active_idx".into())),
            Uuid::nil(),
        );
        assert!(matches!(err, EntityError::AlreadyExists(_)));

        let err = conflict_on_entity(EntityError::Internal("boom".into()), Uuid::nil());
        assert!(matches!(err, EntityError::Internal(_)));
    }
}
