//! # Strata Entity
//!
//! Schema-validated entity documents for the Strata persistence engine.
//!
//! Entities are append-only: updates insert a new row at the next patch
//! version and flip the previous row's active marker inside the same
//! tenant-scoped transaction; deletes insert a terminal tombstone. The
//! payload of every write is validated against the schema's active
//! version before anything touches the table.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata_db::{DbContext, Pool, PoolConfig};
//! use strata_entity::{EntityRepository, NewEntity};
//! use strata_schema::ValidatorCache;
//! use strata_tenant::TenantRecordBuilder;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(PoolConfig::default()).await?;
//! let ctx = Arc::new(DbContext::new(&pool, "strata_admin")?);
//! let repo = EntityRepository::new(ctx, Arc::new(ValidatorCache::new()), Uuid::new_v4());
//!
//! let space = TenantRecordBuilder::new()
//!     .env_key("dev")
//!     .slug("acme-co")
//!     .build()?
//!     .space();
//!
//! let card = repo
//!     .create(
//!         &space,
//!         &NewEntity {
//!             payload: json!({ "name": "Black Lotus" }),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! assert_eq!(card.entity_version.to_string(), "1.0.0");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

/// Error types for entity operations.
pub mod error;

/// Entity rows and list parameters.
pub mod model;

/// The entity repository.
pub mod repository;

/// Per-tenant users store.
pub mod users;

// Re-export commonly used types
pub use error::{EntityError, EntityResult};
pub use model::{EntityRecord, ListParams, NewEntity, SortField, SortOrder};
pub use repository::EntityRepository;
pub use users::{NewUser, UserRecord, UserStore};
