//! Compiled JSON Schema validators with a process-wide cache.
//!
//! A schema definition compiles once per `(schemaId, version)` and the
//! compiled validator is reused until that version is soft-deleted or
//! replaced. Compilation happens under the cache entry's shard lock, so
//! N parallel first-time users of the same version compile it once.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jsonschema::{JSONSchema, ValidationError};
use serde_json::Value;
use strata_core::SemanticVersion;
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};

type ValidatorKey = (Uuid, SemanticVersion);

/// Process-wide cache of compiled validators.
pub struct ValidatorCache {
    compiled: DashMap<ValidatorKey, Arc<JSONSchema>>,
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            compiled: DashMap::new(),
        }
    }

    /// Returns the compiled validator for a schema version, compiling
    /// and caching it on first use.
    ///
    /// Compilation failures are configuration faults: the stored
    /// definition is unusable, which is a different class of error from
    /// a payload failing validation.
    pub fn ensure_compiled(
        &self,
        schema_id: Uuid,
        version: SemanticVersion,
        definition: &Value,
    ) -> SchemaResult<Arc<JSONSchema>> {
        let key = (schema_id, version);

        if let Some(existing) = self.compiled.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        // The vacant entry holds its shard's write lock while we
        // compile, single-flighting concurrent first users.
        match self.compiled.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                tracing::debug!(schema = %schema_id, version = %version, "compiling schema");
                let compiled = JSONSchema::compile(definition)
                    .map_err(|e| SchemaError::InvalidDefinition(e.to_string()))?;
                let compiled = Arc::new(compiled);
                entry.insert(Arc::clone(&compiled));
                Ok(compiled)
            }
        }
    }

    /// Validates a payload against a schema version, reporting the
    /// first failing instance path and reason.
    pub fn validate(
        &self,
        schema_id: Uuid,
        version: SemanticVersion,
        definition: &Value,
        payload: &Value,
    ) -> SchemaResult<()> {
        let validator = self.ensure_compiled(schema_id, version, definition)?;

        let outcome = validator.validate(payload);
        if let Err(mut errors) = outcome {
            if let Some(error) = errors.next() {
                return Err(rejection(&error));
            }
            return Err(SchemaError::PayloadRejected {
                instance_path: String::new(),
                field: "payload".to_string(),
                reason: "payload does not match schema".to_string(),
            });
        }
        Ok(())
    }

    /// Evicts one schema version, typically on soft-delete or replace.
    pub fn invalidate(&self, schema_id: Uuid, version: SemanticVersion) {
        self.compiled.remove(&(schema_id, version));
    }

    /// Evicts every version of a schema.
    pub fn invalidate_schema(&self, schema_id: Uuid) {
        self.compiled.retain(|(id, _), _| *id != schema_id);
    }

    /// Number of cached validators.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Converts the first validation error into a structured rejection.
///
/// Missing-required failures report the missing property as the field;
/// everything else attributes the failure to the deepest instance path
/// segment.
fn rejection(error: &ValidationError<'_>) -> SchemaError {
    let instance_path = error.instance_path.to_string();

    let field = match &error.kind {
        jsonschema::error::ValidationErrorKind::Required { property } => property
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| property.to_string()),
        _ => instance_path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("payload")
            .to_string(),
    };

    SchemaError::PayloadRejected {
        instance_path,
        field,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cards_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "rarity": { "type": "string" }
            },
            "required": ["name"]
        })
    }

    #[test]
    fn test_valid_payload_passes() {
        let cache = ValidatorCache::new();
        let result = cache.validate(
            Uuid::new_v4(),
            SemanticVersion::FIRST,
            &cards_schema(),
            &json!({ "name": "Black Lotus" }),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_required_field_reports_the_field() {
        let cache = ValidatorCache::new();
        let err = cache
            .validate(
                Uuid::new_v4(),
                SemanticVersion::FIRST,
                &cards_schema(),
                &json!({}),
            )
            .unwrap_err();

        match err {
            SchemaError::PayloadRejected { field, reason, .. } => {
                assert_eq!(field, "name");
                assert!(reason.contains("name"));
            }
            other => panic!("expected payload rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_reports_instance_path() {
        let cache = ValidatorCache::new();
        let err = cache
            .validate(
                Uuid::new_v4(),
                SemanticVersion::FIRST,
                &cards_schema(),
                &json!({ "name": 42 }),
            )
            .unwrap_err();

        match err {
            SchemaError::PayloadRejected {
                instance_path,
                field,
                ..
            } => {
                assert_eq!(instance_path, "/name");
                assert_eq!(field, "name");
            }
            other => panic!("expected payload rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_compilation_is_cached_per_version() {
        let cache = ValidatorCache::new();
        let schema_id = Uuid::new_v4();
        let definition = cards_schema();

        let first = cache
            .ensure_compiled(schema_id, SemanticVersion::FIRST, &definition)
            .unwrap();
        let second = cache
            .ensure_compiled(schema_id, SemanticVersion::FIRST, &definition)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache
            .ensure_compiled(schema_id, SemanticVersion::new(1, 1, 0), &definition)
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_evicts_single_version() {
        let cache = ValidatorCache::new();
        let schema_id = Uuid::new_v4();
        let definition = cards_schema();

        cache
            .ensure_compiled(schema_id, SemanticVersion::FIRST, &definition)
            .unwrap();
        cache
            .ensure_compiled(schema_id, SemanticVersion::new(1, 1, 0), &definition)
            .unwrap();

        cache.invalidate(schema_id, SemanticVersion::FIRST);
        assert_eq!(cache.len(), 1);

        cache.invalidate_schema(schema_id);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_broken_definition_is_a_configuration_fault() {
        let cache = ValidatorCache::new();
        let broken = json!({ "type": "not-a-type" });

        let err = cache
            .validate(
                Uuid::new_v4(),
                SemanticVersion::FIRST,
                &broken,
                &json!({}),
            )
            .unwrap_err();

        assert!(matches!(err, SchemaError::InvalidDefinition(_)));
        // nothing broken is cached
        assert!(cache.is_empty());
    }

    #[test]
    fn test_nested_failure_reports_deep_path() {
        let cache = ValidatorCache::new();
        let schema = json!({
            "type": "object",
            "properties": {
                "card": {
                    "type": "object",
                    "properties": { "cost": { "type": "integer" } }
                }
            }
        });

        let err = cache
            .validate(
                Uuid::new_v4(),
                SemanticVersion::FIRST,
                &schema,
                &json!({ "card": { "cost": "zero" } }),
            )
            .unwrap_err();

        match err {
            SchemaError::PayloadRejected { instance_path, .. } => {
                assert_eq!(instance_path, "/card/cost");
            }
            other => panic!("expected payload rejection, got {:?}", other),
        }
    }
}
