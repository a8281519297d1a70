//! Engine configuration with layered file and environment loading.

use std::path::PathBuf;

use serde::Deserialize;
use strata_db::PoolConfig;

use crate::error::EngineResult;

/// Top-level engine configuration.
///
/// Loaded from an optional `strata` config file overlaid with
/// `STRATA_`-prefixed environment variables, e.g.
/// `STRATA_DATABASE__HOST=db.internal`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Environment key prefixed onto every derived tenant name
    pub env_key: String,

    /// Admin namespace holding the shared catalog
    pub admin_schema: String,

    /// Connection pool settings
    pub database: PoolConfig,

    /// TTL for successful tenant resolutions, in seconds
    pub resolution_ttl_secs: u64,

    /// TTL for cached resolution misses, in seconds
    pub negative_resolution_ttl_secs: u64,

    /// Root directory for the local filesystem storage provisioner;
    /// the no-op provisioner is used when unset
    pub storage_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            env_key: "dev".to_string(),
            admin_schema: "strata_admin".to_string(),
            database: PoolConfig::default(),
            resolution_ttl_secs: 60,
            negative_resolution_ttl_secs: 5,
            storage_root: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `strata.{toml,yaml,json}` in the
    /// working directory (optional) overlaid with the environment.
    pub fn load() -> EngineResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from an explicit file path overlaid with the
    /// environment.
    pub fn load_from(path: Option<&str>) -> EngineResult<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name("strata").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("STRATA").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// TTL pair for the resolution cache.
    pub fn resolution_ttls(&self) -> (std::time::Duration, std::time::Duration) {
        (
            std::time::Duration::from_secs(self.resolution_ttl_secs),
            std::time::Duration::from_secs(self.negative_resolution_ttl_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.env_key, "dev");
        assert_eq!(config.admin_schema, "strata_admin");
        assert_eq!(config.resolution_ttl_secs, 60);
        assert_eq!(config.negative_resolution_ttl_secs, 5);
        assert!(config.storage_root.is_none());
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_resolution_ttls() {
        let config = EngineConfig::default();
        let (ttl, negative) = config.resolution_ttls();
        assert_eq!(ttl.as_secs(), 60);
        assert_eq!(negative.as_secs(), 5);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        // no strata.* file in the test working directory
        let config = EngineConfig::load().unwrap();
        assert_eq!(config.admin_schema, "strata_admin");
    }
}
