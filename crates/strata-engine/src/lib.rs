//! # Strata Engine
//!
//! Assembly crate for the Strata multi-tenant document persistence
//! engine: configuration loading, the constructed [`Engine`] value that
//! owns the connection pool and both process-wide caches, admin catalog
//! bootstrap, and tracing setup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_engine::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     strata_engine::telemetry::init();
//!
//!     let engine = Engine::connect(EngineConfig::load()?).await?;
//!     engine.bootstrap().await?;
//!     let admin = engine.bootstrap_admin_tenant().await?;
//!     println!("admin tenant {} is {:?}", admin.slug, admin.status);
//!
//!     let space = engine.resolve_tenant("dev-admin").await?;
//!     println!("resolved namespace {}", space.schema_name);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

/// Engine configuration.
pub mod config;

/// The assembled engine.
pub mod engine;

/// Engine-level errors.
pub mod error;

/// Tracing initialization.
pub mod telemetry;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use strata_core::{CoreError, CoreResult, Page, PageRequest};
