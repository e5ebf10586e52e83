//! Enums shared across resolution, materialization and replication
//!
//! Manifest-facing values use `SCREAMING_SNAKE_CASE` (canonical types) while
//! configuration keywords use `snake_case` (dtype modes).

use serde::{Deserialize, Serialize};

/// Portable column type written to manifests
///
/// Deserialization is total: a canonical name parses to itself, anything else
/// is classified as an engine type name and falls back to `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum CanonicalType {
    Integer,
    Numeric,
    Float,
    Boolean,
    Timestamp,
    Date,
    String,
}

impl CanonicalType {
    /// All canonical types, in manifest documentation order
    pub const ALL: [CanonicalType; 7] = [
        CanonicalType::Integer,
        CanonicalType::Numeric,
        CanonicalType::Float,
        CanonicalType::Boolean,
        CanonicalType::Timestamp,
        CanonicalType::Date,
        CanonicalType::String,
    ];

    /// Name as written in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::Integer => "INTEGER",
            CanonicalType::Numeric => "NUMERIC",
            CanonicalType::Float => "FLOAT",
            CanonicalType::Boolean => "BOOLEAN",
            CanonicalType::Timestamp => "TIMESTAMP",
            CanonicalType::Date => "DATE",
            CanonicalType::String => "STRING",
        }
    }
}

impl std::str::FromStr for CanonicalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown canonical type: {}", s))
    }
}

impl From<String> for CanonicalType {
    fn from(value: String) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| crate::type_map::canonical_type(&value))
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How column types are chosen when binding a CSV input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtypeMode {
    /// Let the engine auto-detect column types
    #[default]
    None,
    /// Use the canonical types declared in the source manifest
    FromManifest,
    /// Read every column as text
    AllVarchar,
}
