//! Versioned JSON Schema repository.
//!
//! Each row binds `(schemaId, version)` to a JSON Schema definition, a
//! tenant-local table name, and a slug. At most one version per schema
//! is active; a schema binds one table name for its lifetime, and a
//! table name belongs to at most one live schema.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use strata_core::{ident, FieldErrors, Page, PageRequest, SemanticVersion};
use strata_db::{validate_identifier, DbContext, DbError};
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};
use crate::validator::ValidatorCache;

const SCHEMA_COLUMNS: &str = "schema_id, schema_version_major, schema_version_minor, \
     schema_version_patch, table_name, slug, category_id, schema_definition, created_at, \
     is_active, is_soft_deleted";

/// One version row of a registered schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaVersionRecord {
    /// Stable schema identifier
    pub schema_id: Uuid,
    /// Version of this row
    pub schema_version: SemanticVersion,
    /// Tenant-local table this schema's entities live in
    pub table_name: String,
    /// URL-safe slug, unique among active rows
    pub slug: String,
    /// Owning category
    pub category_id: Uuid,
    /// The JSON Schema definition
    pub schema_definition: Value,
    /// When this version row was written
    pub created_at: DateTime<Utc>,
    /// At most one version per schema carries this marker
    pub is_active: bool,
    /// Logical deletion marker
    pub is_soft_deleted: bool,
}

/// Input for `create_or_update`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDraft {
    /// Stable schema identifier
    pub schema_id: Uuid,
    /// Version to insert or replace
    pub schema_version: SemanticVersion,
    /// Tenant-local table name; fixed per schema for its lifetime
    pub table_name: String,
    /// Slug, unique among active rows
    pub slug: String,
    /// Owning category
    pub category_id: Uuid,
    /// The JSON Schema definition
    pub schema_definition: Value,
    /// Atomically make this the active version
    pub activate: bool,
}

impl SchemaDraft {
    /// Field-level validation of the draft.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut errors = FieldErrors::new();

        if validate_identifier(&self.table_name).is_err() {
            errors.push(
                "table_name",
                "must be a lowercase SQL identifier of at most 63 bytes",
            );
        }
        if !ident::is_valid_slug(&self.slug) {
            errors.push("slug", "must match [a-z0-9]+(-[a-z0-9]+)*");
        }
        if !self.schema_definition.is_object() {
            errors.push("schema_definition", "must be a JSON object");
        }

        errors.into_result().map_err(|e| match e {
            strata_core::CoreError::Validation(fields) => SchemaError::Validation(fields),
            other => SchemaError::Internal(other.to_string()),
        })
    }
}

/// Store for schema version rows, bound to the admin context.
pub struct SchemaStore {
    ctx: Arc<DbContext>,
    validators: Arc<ValidatorCache>,
}

impl SchemaStore {
    /// Creates a store sharing the engine's validator cache.
    pub fn new(ctx: Arc<DbContext>, validators: Arc<ValidatorCache>) -> Self {
        Self { ctx, validators }
    }

    /// The shared validator cache.
    pub fn validators(&self) -> Arc<ValidatorCache> {
        Arc::clone(&self.validators)
    }

    /// Inserts or replaces the row identified by `(schemaId, version)`,
    /// optionally making it the single active version of its schema.
    ///
    /// Versions lower than existing ones are allowed so history can be
    /// backfilled; activation is the only operation that touches other
    /// rows.
    pub async fn create_or_update(&self, draft: &SchemaDraft) -> SchemaResult<SchemaVersionRecord> {
        draft.validate()?;

        // Compile up front: an uncompilable definition is a
        // configuration fault and nothing must be written.
        self.validators.ensure_compiled(
            draft.schema_id,
            draft.schema_version,
            &draft.schema_definition,
        )?;

        let schema_id = draft.schema_id;
        let schema_version = draft.schema_version;
        let draft = draft.clone();

        let record = self
            .ctx
            .with_admin::<SchemaVersionRecord, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    ensure_table_binding(conn, &draft).await?;

                    if draft.activate {
                        ensure_slug_free(conn, &draft).await?;
                    }

                    let (major, minor, patch) = draft.schema_version.as_columns();
                    let now = Utc::now();

                    sqlx::query(
                        "INSERT INTO schema_repository (schema_id, schema_version_major, \
                         schema_version_minor, schema_version_patch, table_name, slug, \
                         category_id, schema_definition, created_at, is_active, is_soft_deleted) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, FALSE) \
                         ON CONFLICT (schema_id, schema_version_major, schema_version_minor, \
                         schema_version_patch) DO UPDATE SET \
                             table_name = EXCLUDED.table_name, \
                             slug = EXCLUDED.slug, \
                             category_id = EXCLUDED.category_id, \
                             schema_definition = EXCLUDED.schema_definition, \
                             is_soft_deleted = FALSE",
                    )
                    .bind(draft.schema_id)
                    .bind(major)
                    .bind(minor)
                    .bind(patch)
                    .bind(&draft.table_name)
                    .bind(&draft.slug)
                    .bind(draft.category_id)
                    .bind(&draft.schema_definition)
                    .bind(now)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    if draft.activate {
                        sqlx::query(
                            "UPDATE schema_repository SET is_active = FALSE \
                             WHERE schema_id = $1 AND is_active",
                        )
                        .bind(draft.schema_id)
                        .execute(&mut *conn)
                        .await
                        .map_err(DbError::from)?;

                        sqlx::query(
                            "UPDATE schema_repository SET is_active = TRUE \
                             WHERE schema_id = $1 AND schema_version_major = $2 \
                             AND schema_version_minor = $3 AND schema_version_patch = $4",
                        )
                        .bind(draft.schema_id)
                        .bind(major)
                        .bind(minor)
                        .bind(patch)
                        .execute(&mut *conn)
                        .await
                        .map_err(DbError::from)?;
                    }

                    fetch_version(conn, draft.schema_id, draft.schema_version).await
                })
            })
            .await?;

        // The definition may have replaced an earlier one under the
        // same key; recompile on next use.
        self.validators.invalidate(schema_id, schema_version);

        tracing::info!(
            schema = %record.schema_id,
            version = %record.schema_version,
            active = record.is_active,
            "schema version stored"
        );
        Ok(record)
    }

    /// Returns the active, non-soft-deleted version of a schema.
    pub async fn get_active_by_schema_id(
        &self,
        schema_id: Uuid,
    ) -> SchemaResult<SchemaVersionRecord> {
        self.ctx
            .with_admin::<SchemaVersionRecord, SchemaError, _>(move |conn| {
                Box::pin(async move { active_by_schema_id(conn, schema_id).await })
            })
            .await
    }

    /// Returns the active version bound to a table name.
    pub async fn get_active_by_table_name(
        &self,
        table_name: &str,
    ) -> SchemaResult<SchemaVersionRecord> {
        let table_name = table_name.to_string();
        self.ctx
            .with_admin::<SchemaVersionRecord, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM schema_repository \
                         WHERE table_name = $1 AND is_active AND NOT is_soft_deleted",
                        SCHEMA_COLUMNS
                    ))
                    .bind(table_name.as_str())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_schema(&row),
                        None => Err(SchemaError::NotFound(table_name)),
                    }
                })
            })
            .await
    }

    /// Returns a specific version, active or not.
    pub async fn get(
        &self,
        schema_id: Uuid,
        version: SemanticVersion,
    ) -> SchemaResult<SchemaVersionRecord> {
        self.ctx
            .with_admin::<SchemaVersionRecord, SchemaError, _>(move |conn| {
                Box::pin(async move { fetch_version(conn, schema_id, version).await })
            })
            .await
    }

    /// Paginated listing over non-soft-deleted rows; inactive versions
    /// are included on request.
    pub async fn list_all(
        &self,
        include_inactive: bool,
        page: PageRequest,
    ) -> SchemaResult<Page<SchemaVersionRecord>> {
        self.ctx
            .with_admin::<Page<SchemaVersionRecord>, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let filter = if include_inactive {
                        "WHERE NOT is_soft_deleted"
                    } else {
                        "WHERE is_active AND NOT is_soft_deleted"
                    };

                    let total: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM schema_repository {}",
                        filter
                    ))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let rows = sqlx::query(&format!(
                        "SELECT {} FROM schema_repository {} \
                         ORDER BY created_at DESC, schema_id ASC, \
                         schema_version_major DESC, schema_version_minor DESC, \
                         schema_version_patch DESC \
                         LIMIT {} OFFSET {}",
                        SCHEMA_COLUMNS,
                        filter,
                        page.limit(),
                        page.offset()
                    ))
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let items = rows
                        .iter()
                        .map(row_to_schema)
                        .collect::<SchemaResult<Vec<_>>>()?;
                    Ok(Page::new(items, total as u64, page))
                })
            })
            .await
    }

    /// Soft-deletes a version. Forbidden while the version is active;
    /// activation must be moved first.
    pub async fn soft_delete(&self, schema_id: Uuid, version: SemanticVersion) -> SchemaResult<()> {
        self.ctx
            .with_admin::<(), SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let (major, minor, patch) = version.as_columns();

                    let row = sqlx::query(
                        "SELECT is_active FROM schema_repository \
                         WHERE schema_id = $1 AND schema_version_major = $2 \
                         AND schema_version_minor = $3 AND schema_version_patch = $4 \
                         AND NOT is_soft_deleted \
                         FOR UPDATE",
                    )
                    .bind(schema_id)
                    .bind(major)
                    .bind(minor)
                    .bind(patch)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let is_active: bool = match row {
                        Some(row) => row.try_get("is_active").map_err(DbError::from)?,
                        None => {
                            return Err(SchemaError::NotFound(format!(
                                "{} {}",
                                schema_id, version
                            )))
                        }
                    };

                    if is_active {
                        return Err(SchemaError::Precondition(format!(
                            "schema {} version {} is active; activate another version first",
                            schema_id, version
                        )));
                    }

                    sqlx::query(
                        "UPDATE schema_repository SET is_soft_deleted = TRUE \
                         WHERE schema_id = $1 AND schema_version_major = $2 \
                         AND schema_version_minor = $3 AND schema_version_patch = $4",
                    )
                    .bind(schema_id)
                    .bind(major)
                    .bind(minor)
                    .bind(patch)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    Ok(())
                })
            })
            .await?;

        self.validators.invalidate(schema_id, version);
        tracing::info!(schema = %schema_id, version = %version, "schema version soft-deleted");
        Ok(())
    }
}

/// Active-version lookup shared with the entity repository, which runs
/// it inside tenant transactions where the catalog is readable through
/// the search path.
pub async fn active_by_schema_id(
    conn: &mut PgConnection,
    schema_id: Uuid,
) -> SchemaResult<SchemaVersionRecord> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM schema_repository \
         WHERE schema_id = $1 AND is_active AND NOT is_soft_deleted",
        SCHEMA_COLUMNS
    ))
    .bind(schema_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    match row {
        Some(row) => row_to_schema(&row),
        None => Err(SchemaError::NotFound(schema_id.to_string())),
    }
}

/// Version lookup usable from any scoped transaction.
pub async fn fetch_version(
    conn: &mut PgConnection,
    schema_id: Uuid,
    version: SemanticVersion,
) -> SchemaResult<SchemaVersionRecord> {
    let (major, minor, patch) = version.as_columns();
    let row = sqlx::query(&format!(
        "SELECT {} FROM schema_repository \
         WHERE schema_id = $1 AND schema_version_major = $2 \
         AND schema_version_minor = $3 AND schema_version_patch = $4",
        SCHEMA_COLUMNS
    ))
    .bind(schema_id)
    .bind(major)
    .bind(minor)
    .bind(patch)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    match row {
        Some(row) => row_to_schema(&row),
        None => Err(SchemaError::NotFound(format!("{} {}", schema_id, version))),
    }
}

/// Enforces the `(tableName, schemaId)` exclusivity invariant.
async fn ensure_table_binding(conn: &mut PgConnection, draft: &SchemaDraft) -> SchemaResult<()> {
    let other_schema: Option<(Uuid,)> = sqlx::query_as(
        "SELECT schema_id FROM schema_repository \
         WHERE table_name = $1 AND schema_id <> $2 AND NOT is_soft_deleted LIMIT 1",
    )
    .bind(&draft.table_name)
    .bind(draft.schema_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if let Some((owner,)) = other_schema {
        return Err(SchemaError::Conflict(format!(
            "table '{}' is already bound to schema {}",
            draft.table_name, owner
        )));
    }

    let other_table: Option<(String,)> = sqlx::query_as(
        "SELECT table_name FROM schema_repository \
         WHERE schema_id = $1 AND table_name <> $2 AND NOT is_soft_deleted LIMIT 1",
    )
    .bind(draft.schema_id)
    .bind(&draft.table_name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if let Some((bound,)) = other_table {
        return Err(SchemaError::Conflict(format!(
            "schema {} is already bound to table '{}'",
            draft.schema_id, bound
        )));
    }

    Ok(())
}

/// Enforces slug uniqueness among active rows before activation.
async fn ensure_slug_free(conn: &mut PgConnection, draft: &SchemaDraft) -> SchemaResult<()> {
    let taken: Option<(Uuid,)> = sqlx::query_as(
        "SELECT schema_id FROM schema_repository \
         WHERE slug = $1 AND is_active AND NOT is_soft_deleted AND schema_id <> $2 LIMIT 1",
    )
    .bind(&draft.slug)
    .bind(draft.schema_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if taken.is_some() {
        return Err(SchemaError::Conflict(format!(
            "schema slug '{}' already in use",
            draft.slug
        )));
    }
    Ok(())
}

fn row_to_schema(row: &PgRow) -> SchemaResult<SchemaVersionRecord> {
    let version = SemanticVersion::from_columns(
        row.try_get("schema_version_major").map_err(DbError::from)?,
        row.try_get("schema_version_minor").map_err(DbError::from)?,
        row.try_get("schema_version_patch").map_err(DbError::from)?,
    )
    .map_err(|e| SchemaError::Internal(e.to_string()))?;

    Ok(SchemaVersionRecord {
        schema_id: row.try_get("schema_id").map_err(DbError::from)?,
        schema_version: version,
        table_name: row.try_get("table_name").map_err(DbError::from)?,
        slug: row.try_get("slug").map_err(DbError::from)?,
        category_id: row.try_get("category_id").map_err(DbError::from)?,
        schema_definition: row.try_get("schema_definition").map_err(DbError::from)?,
        created_at: row.try_get("created_at").map_err(DbError::from)?,
        is_active: row.try_get("is_active").map_err(DbError::from)?,
        is_soft_deleted: row.try_get("is_soft_deleted").map_err(DbError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> SchemaDraft {
        SchemaDraft {
            schema_id: Uuid::new_v4(),
            schema_version: SemanticVersion::FIRST,
            table_name: "cards_entities".to_string(),
            slug: "cards-schema".to_string(),
            category_id: Uuid::new_v4(),
            schema_definition: json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            }),
            activate: true,
        }
    }

    #[test]
    fn test_draft_validation_accepts_well_formed_input() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_draft_validation_rejects_bad_table_name() {
        let mut bad = draft();
        bad.table_name = "Cards-Entities".to_string();
        match bad.validate().unwrap_err() {
            SchemaError::Validation(fields) => {
                assert!(fields.fields().contains_key("table_name"));
            }
            other => panic!("expected validation, got {:?}", other),
        }
    }

    #[test]
    fn test_draft_validation_rejects_non_object_definition() {
        let mut bad = draft();
        bad.schema_definition = json!("just a string");
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.slug = "Bad Slug".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_wire_shape_serializes_camel_case_with_version_strings() {
        let record = SchemaVersionRecord {
            schema_id: Uuid::nil(),
            schema_version: SemanticVersion::new(1, 0, 0),
            table_name: "cards_entities".to_string(),
            slug: "cards-schema".to_string(),
            category_id: Uuid::nil(),
            schema_definition: json!({ "type": "object" }),
            created_at: Utc::now(),
            is_active: true,
            is_soft_deleted: false,
        };

        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["schemaVersion"], json!("1.0.0"));
        assert_eq!(wire["tableName"], json!("cards_entities"));
        assert_eq!(wire["isActive"], json!(true));
        assert!(wire.get("table_name").is_none());
    }
}
