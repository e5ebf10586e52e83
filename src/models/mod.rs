//! Models module
//!
//! Defines the data structures that flow between resolution, the working
//! set, materialization and replication. Bindings and output specs are
//! transient and owned by a single run; manifests are the only persisted
//! artifact besides the data files themselves.

pub mod enums;
pub mod manifest;
pub mod table;

pub use enums::{CanonicalType, DtypeMode};
pub use manifest::{ID_COLUMN, MANIFEST_SUFFIX, Manifest, ManifestInfo};
pub use table::{
    CsvOptions, InputFile, InputTable, InputTableDescriptor, OutputDeclaration, OutputSource,
    OutputSpec, OutputTableSpec, ResolvedBinding, TableSpec, csv_file_name, is_glob_pattern,
    strip_csv_suffix,
};
