//! Per-tenant users base table.
//!
//! Users live inside the tenant namespace and are invisible from other
//! tenants; the table itself is created by the database provisioner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use strata_core::{FieldErrors, Page, PageRequest};
use strata_db::{DbContext, DbError, TenantScope};
use strata_tenant::TenantSpace;
use uuid::Uuid;

use crate::error::{EntityError, EntityResult};

const USER_COLUMNS: &str = "user_id, email, full_name, created_at, updated_at";

/// A user row in a tenant namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// User identifier
    pub user_id: Uuid,
    /// Email, unique per tenant
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Email address
    pub email: String,
    /// Display name
    pub full_name: String,
}

impl NewUser {
    fn validate(&self) -> EntityResult<()> {
        let mut errors = FieldErrors::new();
        if !self.email.contains('@') || self.email.trim().is_empty() {
            errors.push("email", "must be a valid email address");
        }
        if self.full_name.trim().is_empty() {
            errors.push("full_name", "must not be empty");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EntityError::Validation(errors))
        }
    }
}

/// Store for the per-tenant users table.
pub struct UserStore {
    ctx: Arc<DbContext>,
}

impl UserStore {
    /// Creates a store over the shared context.
    pub fn new(ctx: Arc<DbContext>) -> Self {
        Self { ctx }
    }

    /// Creates a user inside the tenant namespace.
    pub async fn create(&self, space: &TenantSpace, new: &NewUser) -> EntityResult<UserRecord> {
        new.validate()?;
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let new = new.clone();

        let record = self
            .ctx
            .with_tenant::<UserRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let record = UserRecord {
                        user_id: Uuid::new_v4(),
                        email: new.email.trim().to_lowercase(),
                        full_name: new.full_name.trim().to_string(),
                        created_at: now,
                        updated_at: now,
                    };

                    sqlx::query(
                        "INSERT INTO users (user_id, email, full_name, created_at, updated_at) \
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(record.user_id)
                    .bind(&record.email)
                    .bind(&record.full_name)
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        let db = DbError::from(e);
                        if db.is_unique_violation() {
                            EntityError::AlreadyExists(record.email.clone())
                        } else {
                            EntityError::Db(db)
                        }
                    })?;

                    Ok(record)
                })
            })
            .await?;

        tracing::debug!(tenant = %space.slug, user = %record.user_id, "user created");
        Ok(record)
    }

    /// Looks a user up by email.
    pub async fn get_by_email(&self, space: &TenantSpace, email: &str) -> EntityResult<UserRecord> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;
        let email = email.trim().to_lowercase();

        self.ctx
            .with_tenant::<UserRecord, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&format!(
                        "SELECT {} FROM users WHERE email = $1",
                        USER_COLUMNS
                    ))
                    .bind(&email)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    match row {
                        Some(row) => row_to_user(&row),
                        None => Err(EntityError::NotFound(email)),
                    }
                })
            })
            .await
    }

    /// Paginated user listing, newest first.
    pub async fn list(
        &self,
        space: &TenantSpace,
        page: PageRequest,
    ) -> EntityResult<Page<UserRecord>> {
        let scope = TenantScope::new(&space.schema_name, &space.role_name)?;

        self.ctx
            .with_tenant::<Page<UserRecord>, EntityError, _>(&scope, move |conn| {
                Box::pin(async move {
                    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(DbError::from)?;

                    let rows = sqlx::query(&format!(
                        "SELECT {} FROM users ORDER BY created_at DESC, user_id ASC \
                         LIMIT {} OFFSET {}",
                        USER_COLUMNS,
                        page.limit(),
                        page.offset()
                    ))
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DbError::from)?;

                    let items = rows
                        .iter()
                        .map(row_to_user)
                        .collect::<EntityResult<Vec<_>>>()?;
                    Ok(Page::new(items, total as u64, page))
                })
            })
            .await
    }
}

fn row_to_user(row: &PgRow) -> EntityResult<UserRecord> {
    Ok(UserRecord {
        user_id: row.try_get("user_id").map_err(DbError::from)?,
        email: row.try_get("email").map_err(DbError::from)?,
        full_name: row.try_get("full_name").map_err(DbError::from)?,
        created_at: row.try_get("created_at").map_err(DbError::from)?,
        updated_at: row.try_get("updated_at").map_err(DbError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_validation() {
        let good = NewUser {
            email: "ada@acme.example".to_string(),
            full_name: "Ada Lovelace".to_string(),
        };
        assert!(good.validate().is_ok());

        let bad = NewUser {
            email: "not-an-email".to_string(),
            full_name: "  ".to_string(),
        };
        match bad.validate().unwrap_err() {
            EntityError::Validation(fields) => {
                assert!(fields.fields().contains_key("email"));
                assert!(fields.fields().contains_key("full_name"));
            }
            other => panic!("expected validation, got {:?}", other),
        }
    }
}
