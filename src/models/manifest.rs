//! Sidecar manifests describing a table's columns, types and load policy

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::enums::CanonicalType;
use crate::error::{TransformError, TransformResult};

/// Column name that enables id-based deduplication during replication
pub const ID_COLUMN: &str = "id";

/// Manifest file suffix
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Table manifest
///
/// Read from input sidecars and written for every materialized output. For
/// outputs, `columns` is always identical, in order, to the data file's
/// header row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Storage identifier set by the platform's input mapping (e.g. `in.c-main.orders`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Storage URI set by the platform's input mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Ordered column names
    #[serde(default)]
    pub columns: Vec<String>,
    /// Canonical type per column
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_types: BTreeMap<String, CanonicalType>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub incremental: bool,
    /// Alternate logical target name, metadata only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Whether the data file carries a literal header row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
}

impl Manifest {
    /// Path of the sidecar manifest for a data file or sliced directory
    pub fn sidecar_path(data_path: &Path) -> PathBuf {
        let mut name = data_path.as_os_str().to_os_string();
        name.push(MANIFEST_SUFFIX);
        PathBuf::from(name)
    }

    /// Read a manifest from disk
    pub fn read(path: &Path) -> TransformResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TransformError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| TransformError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read the sidecar manifest of a data path, if one exists
    pub fn read_sidecar(data_path: &Path) -> TransformResult<Option<Self>> {
        let path = Self::sidecar_path(data_path);
        if path.is_file() {
            Self::read(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write the manifest as pretty-printed JSON
    pub fn write(&self, path: &Path) -> TransformResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| TransformError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| TransformError::io(path, e))
    }

    /// Whether this manifest was produced by the platform's input mapping
    /// rather than by a previous processing stage
    pub fn is_input_mapping(&self) -> bool {
        self.uri.is_some() || self.id.as_deref().is_some_and(|id| id.starts_with("in."))
    }

    /// Manifest for a freshly materialized CSV output
    pub fn for_output(
        columns: Vec<(String, CanonicalType)>,
        primary_key: Vec<String>,
        incremental: bool,
        destination: Option<String>,
    ) -> Self {
        let column_types = columns.iter().cloned().collect();
        Self {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            column_types,
            primary_key,
            incremental,
            destination,
            has_header: Some(true),
            delimiter: Some(",".to_string()),
            enclosure: Some("\"".to_string()),
            ..Default::default()
        }
    }

    /// Manifest synthesized for a passthrough table that arrived without one
    ///
    /// Types are not inferred; every column is declared `STRING`.
    pub fn synthesized(columns: Vec<String>, has_header: bool) -> Self {
        let column_types = columns
            .iter()
            .map(|c| (c.clone(), CanonicalType::String))
            .collect();
        Self {
            columns,
            column_types,
            has_header: Some(has_header),
            ..Default::default()
        }
    }
}

/// Load policy of an input table as seen by replication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    pub incremental: bool,
    pub columns: Vec<String>,
    pub has_id_column: bool,
}

impl ManifestInfo {
    /// Derive the load policy; a missing manifest degrades to a full load
    pub fn from_manifest(manifest: Option<&Manifest>) -> Self {
        match manifest {
            Some(m) => Self {
                incremental: m.incremental,
                columns: m.columns.clone(),
                has_id_column: m.columns.iter().any(|c| c == ID_COLUMN),
            },
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            Manifest::sidecar_path(Path::new("/data/in/tables/orders.csv")),
            PathBuf::from("/data/in/tables/orders.csv.manifest")
        );
    }

    #[test]
    fn test_output_manifest_keeps_column_order() {
        let manifest = Manifest::for_output(
            vec![
                ("zeta".to_string(), CanonicalType::Integer),
                ("alpha".to_string(), CanonicalType::String),
            ],
            vec!["zeta".to_string()],
            true,
            Some("out.c-main.orders".to_string()),
        );
        assert_eq!(manifest.columns, vec!["zeta", "alpha"]);
        assert_eq!(manifest.column_types["zeta"], CanonicalType::Integer);
        assert_eq!(manifest.has_header, Some(true));
    }

    #[test]
    fn test_write_and_read_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.csv.manifest");
        let manifest = Manifest::for_output(
            vec![("id".to_string(), CanonicalType::Integer)],
            vec!["id".to_string()],
            false,
            None,
        );
        manifest.write(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"column_types\""));
        assert!(!raw.contains("\"destination\""));

        let loaded = Manifest::read(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_read_platform_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.csv.manifest");
        std::fs::write(
            &path,
            r#"{"id": "in.c-main.orders", "columns": ["id", "amount"], "incremental": true,
                "primary_key": ["id"], "delimiter": ";", "enclosure": "'", "rows_count": 12}"#,
        )
        .unwrap();

        let manifest = Manifest::read(&path).unwrap();
        assert!(manifest.is_input_mapping());
        assert_eq!(manifest.delimiter.as_deref(), Some(";"));
        assert!(manifest.column_types.is_empty());
    }

    #[test]
    fn test_malformed_manifest_is_manifest_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.csv.manifest");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Manifest::read(&path),
            Err(TransformError::Manifest { .. })
        ));
    }

    #[test]
    fn test_manifest_info_defaults_to_full_load() {
        assert_eq!(ManifestInfo::from_manifest(None), ManifestInfo::default());

        let manifest = Manifest {
            columns: vec!["id".to_string(), "name".to_string()],
            incremental: true,
            ..Default::default()
        };
        let info = ManifestInfo::from_manifest(Some(&manifest));
        assert!(info.incremental);
        assert!(info.has_id_column);
        assert_eq!(info.columns, vec!["id", "name"]);
    }
}
