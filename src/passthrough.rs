//! Untouched copy of input tables and files to the output directories

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{TransformError, TransformResult};
use crate::models::{InputFile, InputTable, Manifest};
use crate::resolver::read_header;

/// Copy an input table and its manifest to the output tables directory
///
/// A table without a manifest gets one synthesized from its header row,
/// with every column typed `STRING`. Sliced tables have no header row to
/// read, so their synthesized manifest declares no columns.
pub fn copy_table(table: &InputTable, out_dir: &Path) -> TransformResult<PathBuf> {
    let destination = out_dir.join(&table.name);
    copy_path(&table.full_path, &destination)?;

    let source_manifest = Manifest::sidecar_path(&table.full_path);
    let target_manifest = Manifest::sidecar_path(&destination);
    if source_manifest.is_file() {
        fs::copy(&source_manifest, &target_manifest)
            .map_err(|e| TransformError::io(&source_manifest, e))?;
    } else {
        let columns = if table.is_sliced {
            Vec::new()
        } else {
            read_header(table)?
        };
        Manifest::synthesized(columns, !table.is_sliced).write(&target_manifest)?;
    }

    debug!("Table {} passed through", table.name);
    Ok(destination)
}

/// Copy a loose input file (and its manifest, if any) to the output files directory
pub fn copy_file(file: &InputFile, out_dir: &Path) -> TransformResult<PathBuf> {
    let destination = out_dir.join(&file.name);
    copy_path(&file.full_path, &destination)?;

    let source_manifest = Manifest::sidecar_path(&file.full_path);
    if source_manifest.is_file() {
        let target_manifest = Manifest::sidecar_path(&destination);
        fs::copy(&source_manifest, &target_manifest)
            .map_err(|e| TransformError::io(&source_manifest, e))?;
    }

    debug!("File {} passed through", file.name);
    Ok(destination)
}

/// Copy a file, or a directory recursively, merging into existing directories
fn copy_path(source: &Path, destination: &Path) -> TransformResult<()> {
    if source.is_dir() {
        fs::create_dir_all(destination).map_err(|e| TransformError::io(destination, e))?;
        for entry in fs::read_dir(source).map_err(|e| TransformError::io(source, e))? {
            let entry = entry.map_err(|e| TransformError::io(source, e))?;
            copy_path(&entry.path(), &destination.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
        }
        fs::copy(source, destination).map_err(|e| TransformError::io(source, e))?;
    }
    Ok(())
}
