//! Input descriptors, discovered inputs, resolved bindings and output specs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::enums::{CanonicalType, DtypeMode};
use super::manifest::Manifest;
use crate::error::{TransformError, TransformResult};

static RE_CSV_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.csv$").expect("Invalid regex"));

/// Characters that turn an input name into a glob pattern
pub const GLOB_METACHARACTERS: [char; 3] = ['*', '?', '['];

/// Strip a trailing `.csv` suffix (any case) from a table identifier
pub fn strip_csv_suffix(name: &str) -> &str {
    match RE_CSV_SUFFIX.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

/// Output file name for a table identifier: exactly one `.csv` suffix
pub fn csv_file_name(name: &str) -> String {
    format!("{}.csv", strip_csv_suffix(name))
}

/// Whether a name contains glob metacharacters
pub fn is_glob_pattern(name: &str) -> bool {
    name.contains(GLOB_METACHARACTERS)
}

/// Structured input declaration
///
/// Field names follow the current configuration schema; the legacy names
/// are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Exact table name or glob pattern over input table names
    #[serde(default, alias = "input_pattern")]
    pub pattern: String,
    /// Relation name in the working set; mandatory for glob patterns
    #[serde(default, alias = "duckdb_destination", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, alias = "quote_char", skip_serializing_if = "Option::is_none")]
    pub quotechar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_lines: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_filename_column: Option<bool>,
    #[serde(default, alias = "dtype_mode", skip_serializing_if = "Option::is_none")]
    pub dtypes_mode: Option<DtypeMode>,
}

/// An input declaration: either a bare table name or a structured spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputTableDescriptor {
    ByName(String),
    Structured(TableSpec),
}

impl InputTableDescriptor {
    /// The name or pattern this descriptor matches against
    pub fn pattern(&self) -> &str {
        match self {
            InputTableDescriptor::ByName(name) => name,
            InputTableDescriptor::Structured(spec) => &spec.pattern,
        }
    }

    /// Whether this descriptor is a glob pattern
    pub fn is_pattern(&self) -> bool {
        is_glob_pattern(self.pattern())
    }

    /// The explicitly configured relation name, if any
    pub fn destination(&self) -> Option<&str> {
        match self {
            InputTableDescriptor::ByName(_) => None,
            InputTableDescriptor::Structured(spec) => spec.destination.as_deref(),
        }
    }

    /// Normalize into the structured form
    pub fn to_spec(&self) -> TableSpec {
        match self {
            InputTableDescriptor::ByName(name) => TableSpec {
                pattern: name.clone(),
                ..Default::default()
            },
            InputTableDescriptor::Structured(spec) => spec.clone(),
        }
    }

    /// Whether an input table name is covered by this descriptor
    pub fn matches(&self, table_name: &str) -> bool {
        let pattern = self.pattern();
        if is_glob_pattern(pattern) {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(table_name))
                .unwrap_or(false)
        } else {
            pattern == table_name
        }
    }

    /// Relation name used when binding this descriptor
    ///
    /// Patterns require an explicit destination; exact names default to the
    /// input name without its `.csv` suffix.
    pub fn relation_name(&self) -> TransformResult<String> {
        if let Some(destination) = self.destination().filter(|d| !d.is_empty()) {
            return Ok(destination.to_string());
        }
        if self.is_pattern() {
            return Err(TransformError::Configuration(format!(
                "Destination must be set if input path contains pattern: {}",
                self.pattern()
            )));
        }
        Ok(strip_csv_suffix(self.pattern()).to_string())
    }
}

impl From<&str> for InputTableDescriptor {
    fn from(name: &str) -> Self {
        InputTableDescriptor::ByName(name.to_string())
    }
}

/// A table found in the input tables directory
#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    /// File or directory name (e.g. `orders.csv`)
    pub name: String,
    pub full_path: PathBuf,
    /// Stored as a directory of headerless CSV parts
    pub is_sliced: bool,
    pub manifest: Option<Manifest>,
}

impl InputTable {
    /// Declared columns from the manifest (empty when absent)
    pub fn columns(&self) -> &[String] {
        self.manifest.as_ref().map(|m| m.columns.as_slice()).unwrap_or(&[])
    }

    pub fn delimiter(&self) -> &str {
        self.manifest
            .as_ref()
            .and_then(|m| m.delimiter.as_deref())
            .unwrap_or(",")
    }

    pub fn enclosure(&self) -> &str {
        self.manifest
            .as_ref()
            .and_then(|m| m.enclosure.as_deref())
            .unwrap_or("\"")
    }

    /// Whether the manifest came from the platform's input mapping
    pub fn is_input_mapping(&self) -> bool {
        self.manifest.as_ref().is_some_and(Manifest::is_input_mapping)
    }

    /// Name without the `.csv` suffix
    pub fn stem(&self) -> &str {
        strip_csv_suffix(&self.name)
    }

    /// Path to read: the file itself, or every CSV part of a sliced table
    pub fn read_path(&self) -> PathBuf {
        if self.is_sliced {
            self.full_path.join("*.csv")
        } else {
            self.full_path.clone()
        }
    }
}

/// A loose file found in the input files directory
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub name: String,
    pub full_path: PathBuf,
}

/// CSV dialect options passed through to the engine's reader
#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: String,
    pub quote: Option<String>,
    pub skip_lines: Option<u64>,
    pub date_format: Option<String>,
    pub timestamp_format: Option<String>,
    pub add_filename_column: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            quote: None,
            skip_lines: None,
            date_format: None,
            timestamp_format: None,
            add_filename_column: false,
        }
    }
}

/// A fully resolved input, ready to be bound as a named relation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBinding {
    /// Relation name, unique per run
    pub destination_name: String,
    /// Files (or directory globs) to read
    pub physical_paths: Vec<PathBuf>,
    /// Column names to apply, if known
    pub header: Option<Vec<String>>,
    pub has_header_in_file: bool,
    pub dtype_overrides: Option<BTreeMap<String, CanonicalType>>,
    pub all_varchar: bool,
    pub options: CsvOptions,
    /// Names of the input tables this binding covers
    pub matched_tables: Vec<String>,
}

/// Where an output's rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSource {
    /// A relation in the working set
    Relation(String),
    /// A free-form query
    Query(String),
}

/// A table to materialize
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTableSpec {
    pub source: OutputSource,
    /// Identifier the output file name is derived from
    pub table_name: String,
    pub destination: Option<String>,
    pub incremental: bool,
    pub primary_key: Vec<String>,
}

impl OutputTableSpec {
    /// Default spec for materializing a relation under its own name
    pub fn for_relation(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: OutputSource::Relation(strip_csv_suffix(&name).to_string()),
            table_name: name,
            destination: None,
            incremental: false,
            primary_key: Vec::new(),
        }
    }

    /// Output file name, always ending in exactly one `.csv`
    pub fn file_name(&self) -> String {
        csv_file_name(&self.table_name)
    }
}

/// Structured output declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default, alias = "duckdb_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, alias = "kbc_destination", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

/// An output declaration: either a bare name or a structured spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputDeclaration {
    ByName(String),
    Structured(OutputSpec),
}

impl OutputDeclaration {
    /// Convert an advanced-mode declaration into an output spec
    pub fn to_spec(&self) -> TransformResult<OutputTableSpec> {
        match self {
            OutputDeclaration::ByName(name) => Ok(OutputTableSpec::for_relation(name.as_str())),
            OutputDeclaration::Structured(spec) => {
                let source = spec
                    .source
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        TransformError::Configuration(
                            "Missing source in output definition".to_string(),
                        )
                    })?;
                Ok(OutputTableSpec {
                    destination: spec.destination.clone().filter(|d| !d.is_empty()),
                    incremental: spec.incremental,
                    primary_key: spec.primary_key.clone(),
                    ..OutputTableSpec::for_relation(source)
                })
            }
        }
    }
}
