//! Table Transformer - SQL transformations over CSV tables
//!
//! Provides:
//! - Resolution of input descriptors (names, glob patterns, structured specs)
//!   to CSV files, header policy, column names and types
//! - An embedded DuckDB working set the transformations run against
//! - Materialization of results as CSV files with derived manifests
//! - Passthrough of untouched tables and files
//! - Incremental replication of input tables into a MotherDuck warehouse

pub mod config;
pub mod data_dir;
pub mod database;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod passthrough;
pub mod replication;
pub mod resolver;
pub mod type_map;

pub use config::{EmptyPatternPolicy, EngineSettings, Mode, Parameters};
pub use data_dir::DataDir;
pub use database::DuckDBEngine;
pub use error::{TransformError, TransformResult};
pub use orchestrator::{QueryOrchestrator, RunSummary, run};
pub use output::{MaterializedOutput, OutputMaterializer};
pub use replication::{ReplicationAction, ReplicationEngine};
pub use resolver::TableResolver;

// Re-export models
pub use models::enums::*;
pub use models::{
    InputTable, InputTableDescriptor, Manifest, ManifestInfo, OutputTableSpec, ResolvedBinding,
};
