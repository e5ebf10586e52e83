//! Embedded database layer
//!
//! The working set of a run lives in a single DuckDB connection. This module
//! holds the SQL rendering helpers used to bind CSV inputs and to copy
//! results back out; the connection itself is in [`duckdb`].

pub mod duckdb;

pub use self::duckdb::DuckDBEngine;

use std::path::Path;

use crate::models::{CanonicalType, OutputSource, ResolvedBinding};
use crate::type_map;

/// A column as reported by the engine's describe step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    /// Engine-native type name, e.g. `BIGINT` or `DECIMAL(18,3)`
    pub native_type: String,
}

impl ColumnDescription {
    pub fn canonical_type(&self) -> CanonicalType {
        type_map::canonical_type(&self.native_type)
    }
}

/// Quote an identifier for DuckDB
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn literal_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let items: Vec<String> = values.into_iter().map(quote_literal).collect();
    format!("[{}]", items.join(", "))
}

/// Strip trailing semicolons and whitespace so a query can be nested
pub fn normalize_query(query: &str) -> &str {
    query.trim().trim_end_matches(';').trim_end()
}

/// Render the `read_csv(...)` call for a resolved binding
pub fn read_csv_sql(binding: &ResolvedBinding) -> String {
    let paths: Vec<String> = binding
        .physical_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let mut args = vec![
        literal_list(paths.iter().map(String::as_str)),
        format!("delim = {}", quote_literal(&binding.options.delimiter)),
        format!("header = {}", binding.has_header_in_file),
    ];

    if let Some(quote) = &binding.options.quote {
        args.push(format!("quote = {}", quote_literal(quote)));
    }
    if let Some(header) = binding.header.as_ref().filter(|h| !h.is_empty()) {
        args.push(format!(
            "names = {}",
            literal_list(header.iter().map(String::as_str))
        ));
    }
    if let Some(skip) = binding.options.skip_lines {
        args.push(format!("skip = {}", skip));
    }
    if let Some(format) = &binding.options.date_format {
        args.push(format!("dateformat = {}", quote_literal(format)));
    }
    if let Some(format) = &binding.options.timestamp_format {
        args.push(format!("timestampformat = {}", quote_literal(format)));
    }
    if binding.options.add_filename_column {
        args.push("filename = true".to_string());
    }

    if binding.all_varchar {
        args.push("all_varchar = true".to_string());
    } else if let Some(overrides) = binding.dtype_overrides.as_ref().filter(|o| !o.is_empty()) {
        let entries: Vec<String> = overrides
            .iter()
            .map(|(column, canonical)| {
                format!(
                    "{}: {}",
                    quote_literal(column),
                    quote_literal(type_map::engine_type(*canonical))
                )
            })
            .collect();
        args.push(format!("types = {{{}}}", entries.join(", ")));
    }

    format!("read_csv({})", args.join(", "))
}

/// Render a `SELECT` over an output source
pub fn select_sql(source: &OutputSource) -> String {
    match source {
        OutputSource::Relation(name) => format!("SELECT * FROM {}", quote_identifier(name)),
        OutputSource::Query(query) => normalize_query(query).to_string(),
    }
}

/// Render the `COPY ... TO` statement for a CSV output
///
/// Every field is quoted so downstream parsing does not depend on types.
pub fn copy_to_csv_sql(source: &OutputSource, path: &Path) -> String {
    format!(
        "COPY ({}) TO {} (FORMAT CSV, HEADER, DELIMITER ',', FORCE_QUOTE *)",
        select_sql(source),
        quote_literal(&path.display().to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CsvOptions;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn binding() -> ResolvedBinding {
        ResolvedBinding {
            destination_name: "orders".to_string(),
            physical_paths: vec![PathBuf::from("/data/in/tables/orders.csv")],
            header: Some(vec!["id".to_string(), "amount".to_string()]),
            has_header_in_file: true,
            dtype_overrides: None,
            all_varchar: true,
            options: CsvOptions::default(),
            matched_tables: vec!["orders.csv".to_string()],
        }
    }

    #[test]
    fn test_quote_helpers() {
        assert_eq!(quote_identifier("my \"table\""), "\"my \"\"table\"\"\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(normalize_query("  SELECT 1;;  "), "SELECT 1");
    }

    #[test]
    fn test_read_csv_sql_all_varchar() {
        let sql = read_csv_sql(&binding());
        assert_eq!(
            sql,
            "read_csv(['/data/in/tables/orders.csv'], delim = ',', header = true, \
             names = ['id', 'amount'], all_varchar = true)"
        );
    }

    #[test]
    fn test_read_csv_sql_with_options_and_types() {
        let mut b = binding();
        b.all_varchar = false;
        b.has_header_in_file = false;
        b.options = CsvOptions {
            delimiter: ";".to_string(),
            quote: Some("'".to_string()),
            skip_lines: Some(2),
            date_format: Some("%d.%m.%Y".to_string()),
            timestamp_format: None,
            add_filename_column: true,
        };
        b.dtype_overrides = Some(BTreeMap::from([(
            "id".to_string(),
            CanonicalType::Integer,
        )]));

        let sql = read_csv_sql(&b);
        assert!(sql.contains("delim = ';'"));
        assert!(sql.contains("quote = ''''"));
        assert!(sql.contains("header = false"));
        assert!(sql.contains("skip = 2"));
        assert!(sql.contains("dateformat = '%d.%m.%Y'"));
        assert!(sql.contains("filename = true"));
        assert!(sql.contains("types = {'id': 'BIGINT'}"));
        assert!(!sql.contains("all_varchar"));
    }

    #[test]
    fn test_copy_to_csv_sql() {
        let sql = copy_to_csv_sql(
            &OutputSource::Query("SELECT * FROM orders;".to_string()),
            Path::new("/data/out/tables/orders.csv"),
        );
        assert_eq!(
            sql,
            "COPY (SELECT * FROM orders) TO '/data/out/tables/orders.csv' \
             (FORMAT CSV, HEADER, DELIMITER ',', FORCE_QUOTE *)"
        );
    }
}
