//! Input table resolution
//!
//! Turns an [`InputTableDescriptor`] into a [`ResolvedBinding`]: which files
//! to read, whether they carry a header row, which column names apply and
//! how column types are decided.
//!
//! Header presence is decided in this order:
//! 1. explicit `has_header` on the descriptor
//! 2. pattern descriptors are headerless
//! 3. sliced tables are headerless
//! 4. `has_header` declared by the table's manifest
//! 5. tables with declared columns that did not come from the input mapping
//!    are headerless (a previous stage already stripped the header)
//! 6. otherwise the file carries a header row

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TransformError, TransformResult};
use crate::models::{
    CanonicalType, CsvOptions, DtypeMode, InputTable, InputTableDescriptor, ResolvedBinding,
    TableSpec,
};

/// Resolves input descriptors against the tables discovered for a run
pub struct TableResolver<'a> {
    tables: &'a [InputTable],
    detect_types: bool,
}

impl<'a> TableResolver<'a> {
    /// Create a resolver over the available input tables
    ///
    /// `detect_types` is the default for descriptors without a dtype mode:
    /// `false` reads every column as text.
    pub fn new(tables: &'a [InputTable], detect_types: bool) -> Self {
        Self {
            tables,
            detect_types,
        }
    }

    /// Input tables covered by a descriptor, in discovery order
    pub fn matching(&self, descriptor: &InputTableDescriptor) -> Vec<&'a InputTable> {
        self.tables
            .iter()
            .filter(|t| descriptor.matches(&t.name))
            .collect()
    }

    /// Resolve a descriptor to exactly one binding
    pub fn resolve(&self, descriptor: &InputTableDescriptor) -> TransformResult<ResolvedBinding> {
        let spec = descriptor.to_spec();
        if spec.pattern.is_empty() {
            return Err(TransformError::Configuration(
                "Input table name or pattern must not be empty".to_string(),
            ));
        }

        // Checked before any matching so a missing destination fails the
        // same way whether or not files exist.
        let destination_name = descriptor.relation_name()?;

        let binding = if descriptor.is_pattern() {
            self.resolve_pattern(&spec, destination_name)?
        } else {
            self.resolve_exact(&spec, destination_name)?
        };

        debug!(
            "Resolved {} -> {} ({} path(s), header in file: {})",
            spec.pattern,
            binding.destination_name,
            binding.physical_paths.len(),
            binding.has_header_in_file
        );
        Ok(binding)
    }

    fn resolve_exact(
        &self,
        spec: &TableSpec,
        destination_name: String,
    ) -> TransformResult<ResolvedBinding> {
        let matched: Vec<&InputTable> = self
            .tables
            .iter()
            .filter(|t| t.name == spec.pattern)
            .collect();

        let table = match matched.as_slice() {
            [] => return Err(TransformError::NotFound(spec.pattern.clone())),
            [table] => *table,
            _ => {
                return Err(TransformError::AmbiguousMatch {
                    name: spec.pattern.clone(),
                    count: matched.len(),
                });
            }
        };

        let header = match &spec.column_names {
            Some(names) if !names.is_empty() => Some(names.clone()),
            _ if !table.columns().is_empty() => Some(table.columns().to_vec()),
            _ if table.is_sliced => None,
            _ => Some(read_header(table)?).filter(|h| !h.is_empty()),
        };

        let has_header_in_file = spec
            .has_header
            .unwrap_or_else(|| has_header_in_file(table));

        let (dtype_overrides, all_varchar) = self.dtype_policy(spec, Some(table));

        Ok(ResolvedBinding {
            destination_name,
            physical_paths: vec![table.read_path()],
            header,
            has_header_in_file,
            dtype_overrides,
            all_varchar,
            options: csv_options(spec, Some(table)),
            matched_tables: vec![table.name.clone()],
        })
    }

    fn resolve_pattern(
        &self,
        spec: &TableSpec,
        destination_name: String,
    ) -> TransformResult<ResolvedBinding> {
        let compiled = glob::Pattern::new(&spec.pattern).map_err(|e| {
            TransformError::Configuration(format!("Invalid input pattern {}: {}", spec.pattern, e))
        })?;

        let matched: Vec<&InputTable> = self
            .tables
            .iter()
            .filter(|t| compiled.matches(&t.name))
            .collect();

        let mut physical_paths = Vec::new();
        for table in &matched {
            physical_paths.extend(expand_table_files(table)?);
        }
        physical_paths.sort();

        if physical_paths.is_empty() {
            return Err(TransformError::NoFilesMatched(spec.pattern.clone()));
        }

        let first = matched.first().copied();
        let header = match &spec.column_names {
            Some(names) if !names.is_empty() => Some(names.clone()),
            _ => first
                .map(|t| t.columns().to_vec())
                .filter(|columns| !columns.is_empty()),
        };

        let (dtype_overrides, all_varchar) = self.dtype_policy(spec, first);

        Ok(ResolvedBinding {
            destination_name,
            physical_paths,
            header,
            has_header_in_file: spec.has_header.unwrap_or(false),
            dtype_overrides,
            all_varchar,
            options: csv_options(spec, first),
            matched_tables: matched.iter().map(|t| t.name.clone()).collect(),
        })
    }

    /// Per-column type overrides and the all-text flag
    fn dtype_policy(
        &self,
        spec: &TableSpec,
        table: Option<&InputTable>,
    ) -> (Option<BTreeMap<String, CanonicalType>>, bool) {
        let mode = spec.dtypes_mode.unwrap_or(if self.detect_types {
            DtypeMode::None
        } else {
            DtypeMode::AllVarchar
        });

        match mode {
            DtypeMode::None => (None, false),
            DtypeMode::AllVarchar => (None, true),
            DtypeMode::FromManifest => {
                let overrides = table
                    .and_then(|t| t.manifest.as_ref())
                    .map(|m| m.column_types.clone())
                    .filter(|types| !types.is_empty());
                if overrides.is_none() {
                    warn!(
                        "dtypes_mode from_manifest requested for {} but no column types are declared",
                        spec.pattern
                    );
                }
                (overrides, false)
            }
        }
    }
}

/// Inferred header presence for a table, absent explicit configuration
pub fn has_header_in_file(table: &InputTable) -> bool {
    if table.is_sliced {
        return false;
    }
    if let Some(has_header) = table.manifest.as_ref().and_then(|m| m.has_header) {
        return has_header;
    }
    table.columns().is_empty() || table.is_input_mapping()
}

/// Read the first row of a table file using its declared dialect
pub fn read_header(table: &InputTable) -> TransformResult<Vec<String>> {
    let path = &table.full_path;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(first_byte(table.delimiter(), b','))
        .quote(first_byte(table.enclosure(), b'"'))
        .has_headers(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers = reader.headers().map_err(|e| csv_error(path, e))?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// Concrete files of a table: the file itself, or the CSV parts of a slice
fn expand_table_files(table: &InputTable) -> TransformResult<Vec<PathBuf>> {
    if !table.is_sliced {
        return Ok(vec![table.full_path.clone()]);
    }

    let pattern = table.read_path();
    let entries = glob::glob(&pattern.display().to_string()).map_err(|e| {
        TransformError::Configuration(format!("Invalid slice path {}: {}", pattern.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Error accessing path: {}", e),
        }
    }
    Ok(files)
}

fn csv_options(spec: &TableSpec, table: Option<&InputTable>) -> CsvOptions {
    let delimiter = spec
        .delimiter
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| table.map(|t| t.delimiter().to_string()))
        .unwrap_or_else(|| ",".to_string());

    let quote = spec
        .quotechar
        .clone()
        .filter(|q| !q.is_empty())
        .or_else(|| table.map(|t| t.enclosure().to_string()));

    CsvOptions {
        delimiter,
        quote,
        skip_lines: spec.skip_lines,
        date_format: spec.date_format.clone(),
        timestamp_format: spec.timestamp_format.clone(),
        add_filename_column: spec.add_filename_column.unwrap_or(false),
    }
}

fn first_byte(value: &str, default: u8) -> u8 {
    value.as_bytes().first().copied().unwrap_or(default)
}

fn csv_error(path: &Path, err: csv::Error) -> TransformError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => TransformError::io(path, source),
        kind => TransformError::Engine {
            context: format!("read header of {}", path.display()),
            message: format!("{:?}", kind),
        },
    }
}
