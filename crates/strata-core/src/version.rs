//! Semantic version values for tenant, schema, and entity rows.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error returned when parsing a `"major.minor.patch"` string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid semantic version '{input}': {reason}")]
pub struct VersionParseError {
    /// The rejected input
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

/// Immutable `(major, minor, patch)` triple with total ordering.
///
/// Rows never mutate their version; a new row is written with the value
/// produced by one of the `next_*` constructors. Ordering is
/// lexicographic, so `2.0.0 > 1.9.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: u32,
}

impl SemanticVersion {
    /// Initial version assigned to the first row of any versioned record.
    pub const FIRST: SemanticVersion = SemanticVersion::new(1, 0, 0);

    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next patch version: `1.2.3` -> `1.2.4`.
    pub const fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Next minor version: `1.2.3` -> `1.3.0`.
    pub const fn next_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// Next major version: `1.2.3` -> `2.0.0`.
    pub const fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    /// Components as `i32` for binding to integer columns.
    pub const fn as_columns(&self) -> (i32, i32, i32) {
        (self.major as i32, self.minor as i32, self.patch as i32)
    }

    /// Rebuilds a version from integer columns.
    ///
    /// Negative values indicate a corrupted row and are rejected.
    pub fn from_columns(major: i32, minor: i32, patch: i32) -> Result<Self, VersionParseError> {
        if major < 0 || minor < 0 || patch < 0 {
            return Err(VersionParseError {
                input: format!("{}.{}.{}", major, minor, patch),
                reason: "negative component".to_string(),
            });
        }
        Ok(Self::new(major as u32, minor as u32, patch as u32))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| VersionParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split('.');
        let mut component = |name: &str| -> Result<u32, VersionParseError> {
            let raw = parts
                .next()
                .ok_or_else(|| err(&format!("missing {} component", name)))?;
            raw.parse::<u32>()
                .map_err(|_| err(&format!("non-numeric {} component '{}'", name, raw)))
        };

        let major = component("major")?;
        let minor = component("minor")?;
        let patch = component("patch")?;

        if parts.next().is_some() {
            return Err(err("too many components"));
        }

        Ok(Self::new(major, minor, patch))
    }
}

// Wire shapes carry versions as "M.m.p" strings.
impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(SemanticVersion::new(2, 0, 0) > SemanticVersion::new(1, 9, 9));
        assert!(SemanticVersion::new(1, 1, 0) > SemanticVersion::new(1, 0, 99));
        assert!(SemanticVersion::new(1, 0, 1) > SemanticVersion::new(1, 0, 0));
        assert_eq!(SemanticVersion::new(1, 2, 3), SemanticVersion::new(1, 2, 3));
    }

    #[test]
    fn test_next_constructors() {
        let v = SemanticVersion::new(1, 2, 3);
        assert_eq!(v.next_patch(), SemanticVersion::new(1, 2, 4));
        assert_eq!(v.next_minor(), SemanticVersion::new(1, 3, 0));
        assert_eq!(v.next_major(), SemanticVersion::new(2, 0, 0));
        // the original value is untouched
        assert_eq!(v, SemanticVersion::new(1, 2, 3));
    }

    #[test]
    fn test_display_and_parse_round_trip() {
        let v = SemanticVersion::new(10, 0, 7);
        assert_eq!(v.to_string(), "10.0.7");
        assert_eq!("10.0.7".parse::<SemanticVersion>().unwrap(), v);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!("1.2".parse::<SemanticVersion>().is_err());
        assert!("1.2.3.4".parse::<SemanticVersion>().is_err());
        assert!("1.x.3".parse::<SemanticVersion>().is_err());
        assert!("".parse::<SemanticVersion>().is_err());
        assert!("-1.0.0".parse::<SemanticVersion>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let v = SemanticVersion::new(1, 0, 2);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.0.2\"");

        let back: SemanticVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_from_columns_rejects_negative() {
        assert!(SemanticVersion::from_columns(1, 0, 0).is_ok());
        assert!(SemanticVersion::from_columns(-1, 0, 0).is_err());
    }

    #[test]
    fn test_first_is_one_zero_zero() {
        assert_eq!(SemanticVersion::FIRST.to_string(), "1.0.0");
    }
}
