//! Data directory layout and input discovery
//!
//! ```text
//! <data>/config.json
//! <data>/in/tables/<name>.csv[.manifest]   input tables (directories are sliced)
//! <data>/in/files/<name>[.manifest]        loose input files
//! <data>/out/tables/                       materialized and passed-through tables
//! <data>/out/files/                        passed-through files
//! <data>/tmp/                              scratch space for partial outputs
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{TransformError, TransformResult};
use crate::models::{InputFile, InputTable, MANIFEST_SUFFIX, Manifest};

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "KBC_DATADIR";

/// Data directory used when nothing else is configured
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Data directory of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory from the environment
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENV_DATA_DIR).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tables_in(&self) -> PathBuf {
        self.root.join("in").join("tables")
    }

    pub fn files_in(&self) -> PathBuf {
        self.root.join("in").join("files")
    }

    pub fn tables_out(&self) -> PathBuf {
        self.root.join("out").join("tables")
    }

    pub fn files_out(&self) -> PathBuf {
        self.root.join("out").join("files")
    }

    /// Scratch directory for files still being written
    ///
    /// Lives outside `out/` so an interrupted write is never picked up as
    /// output, and on the same filesystem so a rename finishes it.
    pub fn scratch(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Create the output directories if missing
    pub fn ensure_output_dirs(&self) -> TransformResult<()> {
        for dir in [self.tables_out(), self.files_out()] {
            fs::create_dir_all(&dir).map_err(|e| TransformError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Discover input tables with their manifests, sorted by name
    pub fn input_tables(&self) -> TransformResult<Vec<InputTable>> {
        let mut tables = Vec::new();
        for (name, full_path) in list_entries(&self.tables_in())? {
            let manifest = Manifest::read_sidecar(&full_path)?;
            tables.push(InputTable {
                is_sliced: full_path.is_dir(),
                name,
                full_path,
                manifest,
            });
        }
        Ok(tables)
    }

    /// Discover loose input files, sorted by name
    pub fn input_files(&self) -> TransformResult<Vec<InputFile>> {
        Ok(list_entries(&self.files_in())?
            .into_iter()
            .map(|(name, full_path)| InputFile { name, full_path })
            .collect())
    }
}

/// List non-manifest entries of a directory; a missing directory is empty
fn list_entries(dir: &Path) -> TransformResult<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| TransformError::io(dir, e))? {
        let entry = entry.map_err(|e| TransformError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(MANIFEST_SUFFIX) {
            continue;
        }
        entries.push((name, entry.path()));
    }

    // Sort by name for consistent ordering
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
