//! Deterministic identifier derivation for tenant namespaces.
//!
//! Every name a tenant owns in the database (namespace, role, storage
//! prefix) is a pure function of the environment key, the tenant slug,
//! and the tenant UUID. Nothing here performs I/O.

use thiserror::Error;
use uuid::Uuid;

/// PostgreSQL identifier length limit in bytes.
const MAX_IDENTIFIER_BYTES: usize = 63;

/// Suffix appended to a tenant namespace to form its role name.
const ROLE_SUFFIX: &str = "_role";

/// Errors from identifier derivation and descriptor parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    /// The slug contained no usable characters after normalization.
    #[error("slug '{0}' is empty after normalization")]
    EmptySlug(String),

    /// The environment key is not `[a-z0-9]+`.
    #[error("invalid environment key '{0}'")]
    InvalidEnvKey(String),

    /// The external descriptor could not be split into env key and slug.
    #[error("invalid tenant descriptor '{0}'")]
    InvalidDescriptor(String),
}

/// Lowercases the input and replaces every run of characters outside
/// `[a-z0-9]` with a single underscore, trimming leading and trailing
/// underscores.
pub fn to_snake(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut pending_separator = false;

    for ch in slug.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(lower);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Builds the tenant namespace name: `<envKey>_<slugSnake>`, truncated
/// to the PostgreSQL identifier limit with trailing underscores trimmed.
pub fn build_schema_name(env_key: &str, slug: &str) -> Result<String, IdentError> {
    validate_env_key(env_key)?;

    let snake = to_snake(slug);
    if snake.is_empty() {
        return Err(IdentError::EmptySlug(slug.to_string()));
    }

    let mut name = format!("{}_{}", env_key, snake);
    if name.len() > MAX_IDENTIFIER_BYTES {
        name.truncate(MAX_IDENTIFIER_BYTES);
    }
    let name = name.trim_end_matches('_').to_string();

    if name.is_empty() {
        return Err(IdentError::EmptySlug(slug.to_string()));
    }
    Ok(name)
}

/// Role name owned by a tenant namespace: `<schemaName>_role`.
pub fn build_role_name(schema_name: &str) -> String {
    format!("{}{}", schema_name, ROLE_SUFFIX)
}

/// First 8 hex characters of the tenant UUID, without dashes.
pub fn build_short_tenant_id(tenant_id: &Uuid) -> String {
    tenant_id.simple().to_string()[..8].to_string()
}

/// Object-storage base prefix: `<envKey>/<slug>-<shortTenantId>/`.
pub fn build_base_prefix(env_key: &str, slug: &str, short_tenant_id: &str) -> String {
    format!("{}/{}-{}/", env_key, slug, short_tenant_id)
}

/// External tenant descriptor handed to the auth boundary:
/// `<envKey>-<slug>`.
pub fn external_tenant_descriptor(env_key: &str, slug: &str) -> String {
    format!("{}-{}", env_key, slug)
}

/// Splits an external descriptor into `(envKey, slug)`.
///
/// The env key is `[a-z0-9]+` and never contains a hyphen, so the split
/// point is the first hyphen; the remainder must be a well-formed slug.
pub fn parse_external_descriptor(descriptor: &str) -> Result<(String, String), IdentError> {
    let (env_key, slug) = descriptor
        .split_once('-')
        .ok_or_else(|| IdentError::InvalidDescriptor(descriptor.to_string()))?;

    validate_env_key(env_key)
        .map_err(|_| IdentError::InvalidDescriptor(descriptor.to_string()))?;

    if !is_valid_slug(slug) {
        return Err(IdentError::InvalidDescriptor(descriptor.to_string()));
    }

    Ok((env_key.to_string(), slug.to_string()))
}

/// Checks that an environment key is `[a-z0-9]+`.
pub fn validate_env_key(env_key: &str) -> Result<(), IdentError> {
    let ok = !env_key.is_empty()
        && env_key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(IdentError::InvalidEnvKey(env_key.to_string()))
    }
}

/// Checks a slug against `[a-z0-9]+(-[a-z0-9]+)*`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Normalizes free-form input into a catalog slug: lowercase, runs of
/// characters outside `[a-z0-9]` collapse to a single hyphen, no leading
/// or trailing hyphens. Idempotent on its own output.
pub fn normalize_slug(input: &str) -> Result<String, IdentError> {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(lower);
        } else {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        return Err(IdentError::EmptySlug(input.to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake() {
        assert_eq!(to_snake("Acme Co"), "acme_co");
        assert_eq!(to_snake("acme-co"), "acme_co");
        assert_eq!(to_snake("  acme -- co  "), "acme_co");
        assert_eq!(to_snake("ACME"), "acme");
        assert_eq!(to_snake("!!!"), "");
    }

    #[test]
    fn test_build_schema_name() {
        assert_eq!(build_schema_name("dev", "admin").unwrap(), "dev_admin");
        assert_eq!(build_schema_name("dev", "Acme Co").unwrap(), "dev_acme_co");
        assert!(build_schema_name("dev", "!!!").is_err());
        assert!(build_schema_name("Dev", "admin").is_err());
    }

    #[test]
    fn test_build_schema_name_truncates_to_identifier_limit() {
        let long_slug = "a".repeat(100);
        let name = build_schema_name("dev", &long_slug).unwrap();
        assert_eq!(name.len(), 63);
        assert!(!name.ends_with('_'));
    }

    #[test]
    fn test_build_schema_name_trims_trailing_underscores_after_truncation() {
        // 59 chars of slug puts the underscore exactly at the cut point
        let slug = format!("{}_{}", "a".repeat(58), "b".repeat(40));
        let name = build_schema_name("dev", &slug).unwrap();
        assert!(name.len() <= 63);
        assert!(!name.ends_with('_'));
    }

    #[test]
    fn test_build_role_name() {
        assert_eq!(build_role_name("dev_admin"), "dev_admin_role");
    }

    #[test]
    fn test_build_short_tenant_id() {
        let id = Uuid::parse_str("a1b2c3d4-e5f6-4a1b-8c2d-0123456789ab").unwrap();
        assert_eq!(build_short_tenant_id(&id), "a1b2c3d4");
    }

    #[test]
    fn test_build_base_prefix() {
        assert_eq!(
            build_base_prefix("dev", "admin", "a1b2c3d4"),
            "dev/admin-a1b2c3d4/"
        );
    }

    #[test]
    fn test_external_descriptor_round_trip() {
        let descriptor = external_tenant_descriptor("dev", "acme-co");
        assert_eq!(descriptor, "dev-acme-co");

        let (env_key, slug) = parse_external_descriptor(&descriptor).unwrap();
        assert_eq!(env_key, "dev");
        assert_eq!(slug, "acme-co");
    }

    #[test]
    fn test_parse_external_descriptor_rejects_malformed() {
        assert!(parse_external_descriptor("noseparator").is_err());
        assert!(parse_external_descriptor("-leading").is_err());
        assert!(parse_external_descriptor("dev-").is_err());
        assert!(parse_external_descriptor("dev--double").is_err());
        assert!(parse_external_descriptor("DEV-acme").is_err());
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("Card Schemas").unwrap(), "card-schemas");
        assert_eq!(normalize_slug("cards--v2").unwrap(), "cards-v2");
        assert_eq!(normalize_slug("-cards-").unwrap(), "cards");
        assert!(normalize_slug("???").is_err());
    }

    #[test]
    fn test_normalize_slug_is_idempotent() {
        for input in ["Card Schemas", "a--b", " Mixed CASE 42 "] {
            let once = normalize_slug(input).unwrap();
            let twice = normalize_slug(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_schema_name_derivation_is_stable() {
        let first = build_schema_name("dev", "acme co").unwrap();
        let again = build_schema_name("dev", &first).unwrap();
        // re-deriving from an already-derived name only re-prefixes;
        // deriving from the same inputs is what must be stable
        assert_eq!(first, build_schema_name("dev", "acme co").unwrap());
        assert!(again.starts_with("dev_"));
    }
}
