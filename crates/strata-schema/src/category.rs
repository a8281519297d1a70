//! Hierarchical schema-category catalog shared across tenants.
//!
//! Categories live in the admin namespace. Slugs are unique while the
//! row is live; soft-deleting frees the slug but keeps the row readable
//! for listings that ask for it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use strata_core::{ident, FieldErrors, Page, PageRequest};
use strata_db::{DbContext, DbError};
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};

const CATEGORY_COLUMNS: &str =
    "category_id, parent_category_id, name, slug, description, created_at, updated_at, deleted_at";

/// A schema category row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCategory {
    /// Category identifier
    pub category_id: Uuid,
    /// Optional parent for hierarchy
    pub parent_category_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// URL-safe slug, unique while live
    pub slug: String,
    /// Optional description
    pub description: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SchemaCategory {
    /// True when the row has not been soft-deleted.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for creating a category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    /// Display name
    pub name: String,
    /// Slug; normalized from the name when omitted
    pub slug: Option<String>,
    /// Optional parent category
    pub parent_category_id: Option<Uuid>,
    /// Optional description
    pub description: Option<String>,
}

/// Partial update; at least one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    /// New display name
    pub name: Option<String>,
    /// New slug
    pub slug: Option<String>,
    /// New parent category
    pub parent_category_id: Option<Uuid>,
    /// New description
    pub description: Option<String>,
}

impl CategoryUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.parent_category_id.is_none()
            && self.description.is_none()
    }
}

/// Validates and normalizes a create request.
pub(crate) fn prepare_new_category(new: &NewCategory) -> SchemaResult<(String, String)> {
    let mut errors = FieldErrors::new();

    let name = new.name.trim().to_string();
    if name.is_empty() {
        errors.push("name", "must not be empty");
    }

    let slug_source = new.slug.clone().unwrap_or_else(|| name.clone());
    let slug = match ident::normalize_slug(&slug_source) {
        Ok(slug) => slug,
        Err(_) => {
            errors.push("slug", "contains no usable characters");
            String::new()
        }
    };

    if !errors.is_empty() {
        return Err(SchemaError::Validation(errors));
    }
    Ok((name, slug))
}

/// Store for the category catalog, bound to the admin context.
pub struct CategoryCatalog {
    ctx: Arc<DbContext>,
}

impl CategoryCatalog {
    /// Creates a catalog over the admin context.
    pub fn new(ctx: Arc<DbContext>) -> Self {
        Self { ctx }
    }

    /// Paginated listing; soft-deleted rows are included on request.
    pub async fn list(
        &self,
        include_deleted: bool,
        page: PageRequest,
    ) -> SchemaResult<Page<SchemaCategory>> {
        self.ctx
            .with_admin::<Page<SchemaCategory>, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let filter = if include_deleted {
                        ""
                    } else {
                        "WHERE deleted_at IS NULL"
                    };

                    let total: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM schema_categories {}",
                        filter
                    ))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let rows = sqlx::query(&format!(
                        "SELECT {} FROM schema_categories {} \
                         ORDER BY name ASC, category_id ASC LIMIT {} OFFSET {}",
                        CATEGORY_COLUMNS,
                        filter,
                        page.limit(),
                        page.offset()
                    ))
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let items = rows
                        .iter()
                        .map(row_to_category)
                        .collect::<SchemaResult<Vec<_>>>()?;
                    Ok(Page::new(items, total as u64, page))
                })
            })
            .await
    }

    /// Creates a category. The slug is normalized and must be unique
    /// among live rows; the parent must exist and be live.
    pub async fn create(&self, new: &NewCategory) -> SchemaResult<SchemaCategory> {
        let (name, slug) = prepare_new_category(new)?;
        let parent_category_id = new.parent_category_id;
        let description = new.description.clone();

        let created = self
            .ctx
            .with_admin::<SchemaCategory, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    if let Some(parent_id) = parent_category_id {
                        ensure_live_parent(conn, parent_id).await?;
                    }

                    let slug_taken: Option<(Uuid,)> = sqlx::query_as(
                        "SELECT category_id FROM schema_categories \
                         WHERE slug = $1 AND deleted_at IS NULL",
                    )
                    .bind(&slug)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
                    if slug_taken.is_some() {
                        return Err(SchemaError::Conflict(format!(
                            "category slug '{}' already in use",
                            slug
                        )));
                    }

                    let now = Utc::now();
                    let category = SchemaCategory {
                        category_id: Uuid::new_v4(),
                        parent_category_id,
                        name,
                        slug,
                        description,
                        created_at: now,
                        updated_at: now,
                        deleted_at: None,
                    };

                    sqlx::query(
                        "INSERT INTO schema_categories (category_id, parent_category_id, \
                         name, slug, description, created_at, updated_at, deleted_at) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                    )
                    .bind(category.category_id)
                    .bind(category.parent_category_id)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.created_at)
                    .bind(category.updated_at)
                    .bind(category.deleted_at)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| conflict_on_slug(DbError::from(e), &category.slug))?;

                    Ok(category)
                })
            })
            .await?;

        tracing::info!(category = %created.slug, "schema category created");
        Ok(created)
    }

    /// Returns a live category.
    pub async fn get(&self, category_id: Uuid) -> SchemaResult<SchemaCategory> {
        self.ctx
            .with_admin::<SchemaCategory, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM schema_categories \
                         WHERE category_id = $1 AND deleted_at IS NULL",
                        CATEGORY_COLUMNS
                    ))
                    .bind(category_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_category(&row),
                        None => Err(SchemaError::NotFound(category_id.to_string())),
                    }
                })
            })
            .await
    }

    /// Applies a partial update; at least one field must be present.
    pub async fn update(
        &self,
        category_id: Uuid,
        update: &CategoryUpdate,
    ) -> SchemaResult<SchemaCategory> {
        if update.is_empty() {
            return Err(SchemaError::Validation(FieldErrors::single(
                "update",
                "at least one field must be provided",
            )));
        }

        let update = update.clone();
        let updated = self
            .ctx
            .with_admin::<SchemaCategory, SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM schema_categories \
                         WHERE category_id = $1 AND deleted_at IS NULL FOR UPDATE",
                        CATEGORY_COLUMNS
                    ))
                    .bind(category_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let mut category = match row {
                        Some(row) => row_to_category(&row)?,
                        None => return Err(SchemaError::NotFound(category_id.to_string())),
                    };

                    if let Some(name) = &update.name {
                        let name = name.trim();
                        if name.is_empty() {
                            return Err(SchemaError::Validation(FieldErrors::single(
                                "name",
                                "must not be empty",
                            )));
                        }
                        category.name = name.to_string();
                    }

                    if let Some(parent_id) = update.parent_category_id {
                        if parent_id == category_id {
                            return Err(SchemaError::Validation(FieldErrors::single(
                                "parent_category_id",
                                "category cannot be its own parent",
                            )));
                        }
                        ensure_live_parent(conn, parent_id).await?;
                        category.parent_category_id = Some(parent_id);
                    }

                    if let Some(slug) = &update.slug {
                        let slug = ident::normalize_slug(slug).map_err(|_| {
                            SchemaError::Validation(FieldErrors::single(
                                "slug",
                                "contains no usable characters",
                            ))
                        })?;

                        let taken: Option<(Uuid,)> = sqlx::query_as(
                            "SELECT category_id FROM schema_categories \
                             WHERE slug = $1 AND deleted_at IS NULL AND category_id <> $2",
                        )
                        .bind(&slug)
                        .bind(category_id)
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(DbError::from)?;
                        if taken.is_some() {
                            return Err(SchemaError::Conflict(format!(
                                "category slug '{}' already in use",
                                slug
                            )));
                        }
                        category.slug = slug;
                    }

                    if let Some(description) = &update.description {
                        category.description = Some(description.clone());
                    }

                    category.updated_at = Utc::now();

                    sqlx::query(
                        "UPDATE schema_categories \
                         SET parent_category_id = $2, name = $3, slug = $4, \
                             description = $5, updated_at = $6 \
                         WHERE category_id = $1",
                    )
                    .bind(category.category_id)
                    .bind(category.parent_category_id)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.updated_at)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| conflict_on_slug(DbError::from(e), &category.slug))?;

                    Ok(category)
                })
            })
            .await?;

        Ok(updated)
    }

    /// Soft-deletes a category, freeing its slug.
    pub async fn soft_delete(&self, category_id: Uuid) -> SchemaResult<()> {
        self.ctx
            .with_admin::<(), SchemaError, _>(move |conn| {
                Box::pin(async move {
                    let result = sqlx::query(
                        "UPDATE schema_categories SET deleted_at = $2 \
                         WHERE category_id = $1 AND deleted_at IS NULL",
                    )
                    .bind(category_id)
                    .bind(Utc::now())
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    if result.rows_affected() == 0 {
                        return Err(SchemaError::NotFound(category_id.to_string()));
                    }
                    Ok(())
                })
            })
            .await?;

        tracing::info!(category = %category_id, "schema category soft-deleted");
        Ok(())
    }
}

async fn ensure_live_parent(
    conn: &mut sqlx::PgConnection,
    parent_id: Uuid,
) -> SchemaResult<()> {
    let parent: Option<(Uuid,)> = sqlx::query_as(
        "SELECT category_id FROM schema_categories \
         WHERE category_id = $1 AND deleted_at IS NULL",
    )
    .bind(parent_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if parent.is_none() {
        return Err(SchemaError::Validation(FieldErrors::single(
            "parent_category_id",
            "parent category does not exist",
        )));
    }
    Ok(())
}

fn row_to_category(row: &PgRow) -> SchemaResult<SchemaCategory> {
    Ok(SchemaCategory {
        category_id: row.try_get("category_id").map_err(DbError::from)?,
        parent_category_id: row.try_get("parent_category_id").map_err(DbError::from)?,
        name: row.try_get("name").map_err(DbError::from)?,
        slug: row.try_get("slug").map_err(DbError::from)?,
        description: row.try_get("description").map_err(DbError::from)?,
        created_at: row.try_get("created_at").map_err(DbError::from)?,
        updated_at: row.try_get("updated_at").map_err(DbError::from)?,
        deleted_at: row.try_get("deleted_at").map_err(DbError::from)?,
    })
}

fn conflict_on_slug(err: DbError, slug: &str) -> SchemaError {
    if err.is_unique_violation() {
        SchemaError::Conflict(format!("category slug '{}' already in use", slug))
    } else {
        SchemaError::Db(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_new_category_normalizes_slug_from_name() {
        let new = NewCategory {
            name: "Card Schemas".to_string(),
            ..Default::default()
        };
        let (name, slug) = prepare_new_category(&new).unwrap();
        assert_eq!(name, "Card Schemas");
        assert_eq!(slug, "card-schemas");
    }

    #[test]
    fn test_prepare_new_category_prefers_explicit_slug() {
        let new = NewCategory {
            name: "Card Schemas".to_string(),
            slug: Some("Cards V2".to_string()),
            ..Default::default()
        };
        let (_, slug) = prepare_new_category(&new).unwrap();
        assert_eq!(slug, "cards-v2");
    }

    #[test]
    fn test_prepare_new_category_collects_field_errors() {
        let new = NewCategory {
            name: "   ".to_string(),
            slug: Some("???".to_string()),
            ..Default::default()
        };
        match prepare_new_category(&new).unwrap_err() {
            SchemaError::Validation(fields) => {
                assert!(fields.fields().contains_key("name"));
                assert!(fields.fields().contains_key("slug"));
            }
            other => panic!("expected validation, got {:?}", other),
        }
    }

    #[test]
    fn test_category_update_emptiness() {
        assert!(CategoryUpdate::default().is_empty());
        assert!(!CategoryUpdate {
            name: Some("x".into()),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_category_liveness() {
        let now = Utc::now();
        let mut category = SchemaCategory {
            category_id: Uuid::new_v4(),
            parent_category_id: None,
            name: "Cards".into(),
            slug: "cards".into(),
            description: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(category.is_live());
        category.deleted_at = Some(now);
        assert!(!category.is_live());
    }
}
