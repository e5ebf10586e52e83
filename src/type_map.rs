//! DuckDB <-> canonical type mapping helpers.

use crate::models::CanonicalType;

const INTEGER_TYPES: [&str; 11] = [
    "TINYINT",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "HUGEINT",
    "UTINYINT",
    "USMALLINT",
    "UINTEGER",
    "UBIGINT",
    "UHUGEINT",
    "VARINT",
];

const TIMESTAMP_TYPES: [&str; 6] = [
    "TIMESTAMP",
    "TIMESTAMP WITH TIME ZONE",
    "TIMESTAMPTZ",
    "TIMESTAMP_S",
    "TIMESTAMP_MS",
    "TIMESTAMP_NS",
];

/// Map a type name reported by the engine to its canonical type.
///
/// Total: unrecognized names map to `String`. Parameterized names such as
/// `DECIMAL(18,3)` are classified by their base name; list and array types
/// like `DECIMAL(18,3)[]` are not.
pub fn canonical_type(native: &str) -> CanonicalType {
    let base = match native.split_once('(') {
        Some((base, _)) if native.ends_with(')') && !native.contains('[') => base.trim_end(),
        _ => native,
    };

    if INTEGER_TYPES.contains(&base) {
        CanonicalType::Integer
    } else if base == "DECIMAL" || base == "REAL" {
        CanonicalType::Numeric
    } else if base == "DOUBLE" {
        CanonicalType::Float
    } else if base == "BOOLEAN" {
        CanonicalType::Boolean
    } else if TIMESTAMP_TYPES.contains(&base) {
        CanonicalType::Timestamp
    } else if base == "DATE" {
        CanonicalType::Date
    } else {
        CanonicalType::String
    }
}

/// Engine type used when a canonical type is forced onto a CSV column.
pub fn engine_type(canonical: CanonicalType) -> &'static str {
    match canonical {
        CanonicalType::Integer => "BIGINT",
        CanonicalType::Numeric => "DECIMAL(38,9)",
        CanonicalType::Float => "DOUBLE",
        CanonicalType::Boolean => "BOOLEAN",
        CanonicalType::Timestamp => "TIMESTAMP",
        CanonicalType::Date => "DATE",
        CanonicalType::String => "VARCHAR",
    }
}
