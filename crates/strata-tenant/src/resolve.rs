//! Tenant-space resolution for the request boundary.
//!
//! The boundary layer hands in either an internal tenant UUID or an
//! external descriptor of the form `<envKey>-<slug>`. Resolution goes
//! through a short-TTL cache; every registry write invalidates the
//! affected entries, and misses are cached only briefly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use strata_core::ident;
use uuid::Uuid;

use crate::error::{TenantError, TenantResult};
use crate::registry::TenantRegistry;
use crate::tenant::TenantSpace;

/// Default TTL for successful resolutions.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default TTL for cached misses; kept short so newly created tenants
/// become visible quickly.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(5);

enum CachedResolution {
    Found {
        space: TenantSpace,
        inserted_at: Instant,
    },
    Missing {
        inserted_at: Instant,
    },
}

/// TTL cache for resolved tenant spaces, keyed by the caller's input.
pub struct ResolutionCache {
    entries: DashMap<String, CachedResolution>,
    ttl: Duration,
    negative_ttl: Duration,
}

impl ResolutionCache {
    /// Creates a cache with the given TTLs.
    pub fn new(ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            negative_ttl,
        }
    }

    /// Cache with the default TTLs.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_NEGATIVE_TTL)
    }

    /// Returns `Some(Some(space))` on a hit, `Some(None)` on a cached
    /// miss, `None` when the key is absent or expired.
    pub fn get(&self, key: &str) -> Option<Option<TenantSpace>> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.value() {
                CachedResolution::Found { space, inserted_at } => {
                    if inserted_at.elapsed() <= self.ttl {
                        return Some(Some(space.clone()));
                    }
                    true
                }
                CachedResolution::Missing { inserted_at } => {
                    if inserted_at.elapsed() <= self.negative_ttl {
                        return Some(None);
                    }
                    true
                }
            },
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Caches a successful resolution.
    pub fn insert_found(&self, key: impl Into<String>, space: TenantSpace) {
        self.entries.insert(
            key.into(),
            CachedResolution::Found {
                space,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Caches a miss.
    pub fn insert_missing(&self, key: impl Into<String>) {
        self.entries.insert(
            key.into(),
            CachedResolution::Missing {
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every entry that could refer to the given tenant,
    /// including cached misses keyed by its id or slug.
    pub fn invalidate_tenant(&self, tenant_id: &Uuid, slug: &str) {
        let id_key = tenant_id.to_string();
        self.entries.retain(|key, value| match value {
            CachedResolution::Found { space, .. } => {
                space.tenant_id != *tenant_id && space.slug != slug
            }
            CachedResolution::Missing { .. } => {
                key != &id_key && !key.ends_with(&format!("-{}", slug))
            }
        });
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves external or internal tenant identifiers to tenant spaces.
pub struct TenantDirectory {
    registry: Arc<TenantRegistry>,
    env_key: String,
    cache: Arc<ResolutionCache>,
}

impl TenantDirectory {
    /// Creates a directory for the configured environment.
    pub fn new(
        registry: Arc<TenantRegistry>,
        env_key: impl Into<String>,
        cache: Arc<ResolutionCache>,
    ) -> TenantResult<Self> {
        let env_key = env_key.into();
        ident::validate_env_key(&env_key)?;
        Ok(Self {
            registry,
            env_key,
            cache,
        })
    }

    /// The shared cache, for wiring into the registry's invalidation.
    pub fn cache(&self) -> Arc<ResolutionCache> {
        Arc::clone(&self.cache)
    }

    /// Resolves a UUID or `<envKey>-<slug>` descriptor to the active
    /// tenant's space.
    pub async fn resolve(&self, input: &str) -> TenantResult<TenantSpace> {
        if let Some(cached) = self.cache.get(input) {
            return cached.ok_or_else(|| TenantError::NotFound(input.to_string()));
        }

        let outcome = match Uuid::parse_str(input) {
            Ok(tenant_id) => self.registry.get_active(tenant_id).await,
            Err(_) => {
                let (env_key, slug) = ident::parse_external_descriptor(input)?;
                if env_key != self.env_key {
                    return Err(TenantError::InvalidDescriptor(format!(
                        "descriptor '{}' does not belong to environment '{}'",
                        input, self.env_key
                    )));
                }
                self.registry.get_by_slug(&slug).await
            }
        };

        match outcome {
            Ok(record) => {
                let space = record.space();
                self.cache.insert_found(input, space.clone());
                Ok(space)
            }
            Err(e) if e.is_not_found() => {
                self.cache.insert_missing(input);
                Err(TenantError::NotFound(input.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantRecordBuilder;

    fn space(slug: &str) -> TenantSpace {
        TenantRecordBuilder::new()
            .env_key("dev")
            .slug(slug)
            .build()
            .unwrap()
            .space()
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = ResolutionCache::with_defaults();
        assert!(cache.get("dev-acme").is_none());

        let acme = space("acme");
        cache.insert_found("dev-acme", acme.clone());
        assert_eq!(cache.get("dev-acme"), Some(Some(acme)));

        cache.insert_missing("dev-ghost");
        assert_eq!(cache.get("dev-ghost"), Some(None));
    }

    #[test]
    fn test_cache_expiry() {
        let cache = ResolutionCache::new(Duration::from_millis(5), Duration::from_millis(5));
        cache.insert_found("dev-acme", space("acme"));
        cache.insert_missing("dev-ghost");

        std::thread::sleep(Duration::from_millis(10));

        assert!(cache.get("dev-acme").is_none());
        assert!(cache.get("dev-ghost").is_none());
        // expired entries are removed on read
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_tenant_drops_both_key_shapes() {
        let cache = ResolutionCache::with_defaults();
        let acme = space("acme");
        let other = space("other");

        cache.insert_found("dev-acme", acme.clone());
        cache.insert_found(acme.tenant_id.to_string(), acme.clone());
        cache.insert_found("dev-other", other.clone());
        cache.insert_missing("dev-acme-two");

        cache.invalidate_tenant(&acme.tenant_id, "acme");

        assert!(cache.get("dev-acme").is_none());
        assert!(cache.get(&acme.tenant_id.to_string()).is_none());
        assert!(cache.get("dev-other").is_some());
    }

    #[test]
    fn test_invalidate_drops_negative_entries_for_slug() {
        let cache = ResolutionCache::with_defaults();
        let ghost_id = Uuid::new_v4();
        cache.insert_missing("dev-ghost");
        cache.insert_missing(ghost_id.to_string());

        cache.invalidate_tenant(&ghost_id, "ghost");

        assert!(cache.get("dev-ghost").is_none());
        assert!(cache.get(&ghost_id.to_string()).is_none());
    }
}
