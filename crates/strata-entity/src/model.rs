//! Entity document rows and list parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{PageRequest, SemanticVersion};
use uuid::Uuid;

/// One immutable version row of an entity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Stable entity identifier
    pub entity_id: Uuid,
    /// Version of this row; next patch on every update
    pub entity_version: SemanticVersion,
    /// Schema the payload was validated against
    pub schema_id: Uuid,
    /// Schema version the payload was validated against
    pub schema_version: SemanticVersion,
    /// The document payload
    pub payload: Value,
    /// When this version row was written
    pub created_at: DateTime<Utc>,
    /// Caller that wrote this version row
    pub created_by: Option<Uuid>,
    /// At most one row per entity carries this marker
    pub is_active: bool,
    /// Terminal tombstone marker
    pub is_soft_deleted: bool,
}

/// Input for creating an entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEntity {
    /// Caller-supplied id; generated when omitted
    pub entity_id: Option<Uuid>,
    /// The document payload
    pub payload: Value,
    /// Creating principal
    pub created_by: Option<Uuid>,
}

/// Whitelisted sort fields for entity listings.
///
/// `Slug` sorts on the payload's `slug` property; entity tables carry
/// no dedicated slug column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Sort by row creation time
    #[default]
    CreatedAt,
    /// Sort by the payload's slug property
    Slug,
}

impl SortField {
    /// The SQL expression this field maps to. Nothing user-supplied is
    /// ever interpolated; the variants are the whitelist.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Slug => "payload->>'slug'",
        }
    }

    /// Parses caller input against the whitelist.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created_at" => Some(SortField::CreatedAt),
            "slug" => Some(SortField::Slug),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    #[default]
    Desc,
}

impl SortOrder {
    /// The SQL keyword this direction maps to.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Parses caller input against the whitelist.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Parameters for entity listings and counts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
    /// Only the current row per entity
    pub only_active: bool,
    /// Include tombstoned rows
    pub include_deleted: bool,
    /// Pagination
    pub page: PageRequest,
    /// Sort field, whitelisted
    pub sort_field: SortField,
    /// Sort direction, whitelisted
    pub sort_order: SortOrder,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            only_active: true,
            include_deleted: false,
            page: PageRequest::default(),
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListParams {
    /// Full history of every entity, tombstones included.
    pub fn history() -> Self {
        Self {
            only_active: false,
            include_deleted: true,
            ..Self::default()
        }
    }

    /// `WHERE` clause for these filters; empty when unfiltered.
    pub fn where_clause(&self) -> &'static str {
        match (self.only_active, self.include_deleted) {
            (true, false) => "WHERE is_active AND NOT is_soft_deleted",
            (true, true) => "WHERE is_active",
            (false, false) => "WHERE NOT is_soft_deleted",
            (false, true) => "",
        }
    }

    /// `ORDER BY` clause built only from whitelisted parts.
    pub fn order_clause(&self) -> String {
        format!(
            "ORDER BY {} {}, entity_id ASC, entity_version_major ASC, \
             entity_version_minor ASC, entity_version_patch ASC",
            self.sort_field.as_sql(),
            self.sort_order.as_sql()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_contract() {
        let params = ListParams::default();
        assert!(params.only_active);
        assert!(!params.include_deleted);
        assert_eq!(params.sort_field, SortField::CreatedAt);
        assert_eq!(params.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_sort_whitelist_rejects_unknown_input() {
        assert_eq!(SortField::parse("created_at"), Some(SortField::CreatedAt));
        assert_eq!(SortField::parse("slug"), Some(SortField::Slug));
        assert_eq!(SortField::parse("payload; DROP TABLE"), None);
        assert_eq!(SortField::parse("updated_at"), None);

        assert_eq!(SortOrder::parse("ASC"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("sideways"), None);
    }

    #[test]
    fn test_where_clause_combinations() {
        let mut params = ListParams::default();
        assert_eq!(
            params.where_clause(),
            "WHERE is_active AND NOT is_soft_deleted"
        );

        params.include_deleted = true;
        assert_eq!(params.where_clause(), "WHERE is_active");

        params.only_active = false;
        assert_eq!(params.where_clause(), "");

        params.include_deleted = false;
        assert_eq!(params.where_clause(), "WHERE NOT is_soft_deleted");
    }

    #[test]
    fn test_order_clause_uses_whitelisted_sql_only() {
        let params = ListParams {
            sort_field: SortField::Slug,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let clause = params.order_clause();
        assert!(clause.starts_with("ORDER BY payload->>'slug' ASC"));
    }

    #[test]
    fn test_wire_shape_serializes_camel_case_with_version_strings() {
        let record = EntityRecord {
            entity_id: Uuid::nil(),
            entity_version: SemanticVersion::new(1, 0, 1),
            schema_id: Uuid::nil(),
            schema_version: SemanticVersion::FIRST,
            payload: json!({ "name": "Black Lotus" }),
            created_at: Utc::now(),
            created_by: None,
            is_active: true,
            is_soft_deleted: false,
        };

        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["entityVersion"], json!("1.0.1"));
        assert_eq!(wire["schemaVersion"], json!("1.0.0"));
        assert_eq!(wire["isSoftDeleted"], json!(false));
        assert!(wire.get("entity_version").is_none());
    }
}
