//! Output materialization
//!
//! Every output is written as a manifest plus a CSV data file. The manifest
//! columns come from the engine's describe step, so they always match the
//! header row the copy writes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::database::DuckDBEngine;
use crate::error::{TransformError, TransformResult};
use crate::models::{Manifest, OutputTableSpec};

/// A materialized output on disk
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedOutput {
    pub data_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
}

/// Writes relations and query results to the output tables directory
pub struct OutputMaterializer {
    out_dir: PathBuf,
    /// Where data files are written before being renamed into `out_dir`
    scratch_dir: PathBuf,
}

impl OutputMaterializer {
    pub fn new(out_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Materialize one output
    ///
    /// The manifest is written first and the data copied to a file in the
    /// scratch directory that is renamed into place. If the copy fails the manifest is
    /// removed again, so a manifest never outlives its data file.
    pub fn materialize(
        &self,
        engine: &DuckDBEngine,
        spec: &OutputTableSpec,
    ) -> TransformResult<MaterializedOutput> {
        let file_name = spec.file_name();

        let columns = engine
            .describe(&spec.source)?
            .into_iter()
            .map(|c| {
                let canonical = c.canonical_type();
                debug!("{}.{}: {} -> {}", file_name, c.name, c.native_type, canonical);
                (c.name, canonical)
            })
            .collect();

        let manifest = Manifest::for_output(
            columns,
            spec.primary_key.clone(),
            spec.incremental,
            spec.destination.clone(),
        );

        for dir in [&self.out_dir, &self.scratch_dir] {
            fs::create_dir_all(dir).map_err(|e| TransformError::io(dir, e))?;
        }
        let data_path = self.out_dir.join(&file_name);
        let manifest_path = Manifest::sidecar_path(&data_path);
        let tmp_path = self.scratch_dir.join(format!("{}.tmp", file_name));

        manifest.write(&manifest_path)?;

        let written = engine
            .copy_to_csv(&spec.source, &tmp_path)
            .map_err(|e| match e {
                TransformError::Engine { message, .. } => TransformError::Engine {
                    context: format!("writing output table {}", file_name),
                    message,
                },
                other => other,
            })
            .and_then(|_| {
                fs::rename(&tmp_path, &data_path).map_err(|e| TransformError::io(&data_path, e))
            });

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            let _ = fs::remove_file(&manifest_path);
            return Err(e);
        }

        info!(
            "Table {} export finished ({} columns)",
            file_name,
            manifest.columns.len()
        );

        Ok(MaterializedOutput {
            data_path,
            manifest_path,
            manifest,
        })
    }
}
