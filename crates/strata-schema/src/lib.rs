//! # Strata Schema
//!
//! The shared schema catalog for the Strata persistence engine:
//! hierarchical schema categories, versioned JSON Schema definitions
//! bound to tenant-local table names, and a process-wide cache of
//! compiled validators.
//!
//! The catalog lives in the admin namespace; tenants read and reference
//! it but never write.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata_core::SemanticVersion;
//! use strata_db::{DbContext, Pool, PoolConfig};
//! use strata_schema::{SchemaDraft, SchemaStore, ValidatorCache};
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(PoolConfig::default()).await?;
//! let ctx = Arc::new(DbContext::new(&pool, "strata_admin")?);
//! let store = SchemaStore::new(ctx, Arc::new(ValidatorCache::new()));
//!
//! let draft = SchemaDraft {
//!     schema_id: Uuid::new_v4(),
//!     schema_version: SemanticVersion::FIRST,
//!     table_name: "cards_entities".to_string(),
//!     slug: "cards-schema".to_string(),
//!     category_id: Uuid::new_v4(),
//!     schema_definition: json!({
//!         "type": "object",
//!         "required": ["name"],
//!         "properties": { "name": { "type": "string" } }
//!     }),
//!     activate: true,
//! };
//! let stored = store.create_or_update(&draft).await?;
//! assert!(stored.is_active);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

/// Hierarchical schema-category catalog.
pub mod category;

/// Error types for schema operations.
pub mod error;

/// Versioned schema repository.
pub mod repository;

/// Compiled-validator cache.
pub mod validator;

// Re-export commonly used types
pub use category::{CategoryCatalog, CategoryUpdate, NewCategory, SchemaCategory};
pub use error::{SchemaError, SchemaResult};
pub use repository::{SchemaDraft, SchemaStore, SchemaVersionRecord};
pub use validator::ValidatorCache;
