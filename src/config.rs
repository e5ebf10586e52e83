//! Run configuration
//!
//! Handles parsing of the `parameters` section of `config.json` and the
//! environment overrides for the embedded engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{TransformError, TransformResult};
use crate::models::{InputTableDescriptor, OutputDeclaration};

/// Configuration filename inside the data directory
pub const CONFIG_FILENAME: &str = "config.json";

/// Default target schema for replication
pub const DEFAULT_SCHEMA: &str = "main";

/// Environment variable holding the warehouse access token
pub const ENV_MOTHERDUCK_TOKEN: &str = "motherduck_token";

/// Environment variable for engine thread count
pub const ENV_DUCKDB_THREADS: &str = "DUCKDB_THREADS";

/// Environment variable for engine memory ceiling
pub const ENV_DUCKDB_MEMORY_LIMIT: &str = "DUCKDB_MEMORY_LIMIT";

/// Environment variable for engine spill directory
pub const ENV_DUCKDB_TEMP_DIRECTORY: &str = "DUCKDB_TEMP_DIRECTORY";

/// Processing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One query per matched input table, everything else passed through
    #[default]
    Simple,
    /// Explicit inputs, ordered statements and declared outputs
    Advanced,
    /// Mirror every input table into the remote warehouse
    Replicate,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Simple => write!(f, "simple"),
            Mode::Advanced => write!(f, "advanced"),
            Mode::Replicate => write!(f, "replicate"),
        }
    }
}

/// What to do when a pattern input matches no files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPatternPolicy {
    /// Log a warning and finish the run cleanly, keeping outputs produced so far
    #[default]
    Stop,
    /// Fail the run with a user-facing error
    Fail,
    /// Log a warning, leave the binding out and continue
    Skip,
}

/// One simple-mode transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    #[serde(alias = "in_tables")]
    pub input: InputTableDescriptor,
    pub query: String,
    #[serde(default, alias = "out_tables", skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDeclaration>,
}

/// The `queries` parameter, whose shape depends on the mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueriesParam {
    /// Advanced mode: ordered SQL statements
    Statements(Vec<String>),
    /// Simple mode: list of `{input, query, output?}`
    Entries(Vec<QueryEntry>),
    /// Simple mode: table name to SQL
    Mapping(BTreeMap<String, String>),
}

/// The `parameters` section of `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<QueriesParam>,
    #[serde(default, alias = "in_tables")]
    pub input: Vec<InputTableDescriptor>,
    #[serde(default, alias = "out_tables")]
    pub output: Vec<OutputDeclaration>,
    /// Let the engine detect column types when a descriptor sets no dtype mode
    #[serde(default)]
    pub detect_types: bool,
    /// Target warehouse database (replication)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Target catalog schema (replication)
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub empty_pattern_policy: EmptyPatternPolicy,
    #[serde(default)]
    pub debug: bool,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            queries: None,
            input: Vec::new(),
            output: Vec::new(),
            detect_types: false,
            database: None,
            schema: default_schema(),
            empty_pattern_policy: EmptyPatternPolicy::default(),
            debug: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    parameters: Option<Parameters>,
}

impl Parameters {
    /// Load parameters from `config.json` in the data directory
    pub fn load(data_dir: &Path) -> TransformResult<Self> {
        let path = data_dir.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Err(TransformError::Configuration(format!(
                "Configuration file {} not found",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| TransformError::io(&path, e))?;
        Self::parse(&content)
    }

    /// Parse a full `config.json` document
    pub fn parse(content: &str) -> TransformResult<Self> {
        let file: ConfigFile = serde_json::from_str(content).map_err(|e| {
            TransformError::Configuration(format!("Failed to parse configuration: {}", e))
        })?;
        Ok(file.parameters.unwrap_or_default())
    }

    /// Simple-mode transformations in configuration order
    pub fn simple_queries(&self) -> TransformResult<Vec<QueryEntry>> {
        match &self.queries {
            None => Ok(Vec::new()),
            Some(QueriesParam::Entries(entries)) => Ok(entries.clone()),
            Some(QueriesParam::Mapping(mapping)) => Ok(mapping
                .iter()
                .map(|(table, query)| QueryEntry {
                    input: InputTableDescriptor::ByName(table.clone()),
                    query: query.clone(),
                    output: None,
                })
                .collect()),
            Some(QueriesParam::Statements(statements)) if statements.is_empty() => Ok(Vec::new()),
            Some(QueriesParam::Statements(_)) => Err(TransformError::Configuration(
                "Simple mode expects 'queries' as a mapping of table name to query \
                 or a list of {input, query} objects"
                    .to_string(),
            )),
        }
    }

    /// Advanced-mode statements in configuration order
    pub fn statements(&self) -> TransformResult<Vec<String>> {
        match &self.queries {
            None => Ok(Vec::new()),
            Some(QueriesParam::Statements(statements)) => Ok(statements.clone()),
            Some(_) => Err(TransformError::Configuration(
                "Advanced mode expects 'queries' as a list of SQL statements".to_string(),
            )),
        }
    }

    /// Target database for replication
    pub fn require_database(&self) -> TransformResult<&str> {
        self.database
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                TransformError::Configuration(
                    "Missing 'database' parameter in configuration.".to_string(),
                )
            })
    }
}

/// Resource budget for the embedded engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub threads: i64,
    pub memory_limit: String,
    /// Spill directory; `None` keeps the engine default
    pub temp_directory: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let tmp = std::env::var_os("TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            threads: 4,
            memory_limit: "512MB".to_string(),
            temp_directory: Some(tmp.join("duckdb")),
        }
    }
}

impl EngineSettings {
    /// Default settings with environment overrides applied
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(threads) = std::env::var(ENV_DUCKDB_THREADS)
            && let Ok(threads) = threads.parse()
        {
            self.threads = threads;
        }

        if let Ok(limit) = std::env::var(ENV_DUCKDB_MEMORY_LIMIT) {
            self.memory_limit = limit;
        }

        if let Ok(dir) = std::env::var(ENV_DUCKDB_TEMP_DIRECTORY) {
            self.temp_directory = Some(PathBuf::from(dir));
        }
    }
}
