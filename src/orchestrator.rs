//! Run orchestration
//!
//! A run reads `config.json`, discovers the inputs and then follows one of
//! three modes:
//!
//! - **simple**: every configured `{input, query}` pair is bound and its
//!   query materialized; all other tables and every file are passed through.
//! - **advanced**: the configured inputs are bound as named relations, the
//!   statements run in order, unmatched tables are passed through and the
//!   declared outputs are materialized.
//! - **replicate**: every input table is loaded into the warehouse.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{
    EmptyPatternPolicy, ENV_MOTHERDUCK_TOKEN, EngineSettings, Mode, Parameters, QueryEntry,
};
use crate::data_dir::DataDir;
use crate::database::DuckDBEngine;
use crate::error::{TransformError, TransformResult};
use crate::models::{
    InputFile, InputTable, InputTableDescriptor, OutputDeclaration, OutputSource,
    OutputTableSpec, ResolvedBinding,
};
use crate::output::OutputMaterializer;
use crate::passthrough;
use crate::replication::ReplicationEngine;
use crate::resolver::TableResolver;

/// What a run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub tables_transformed: usize,
    pub tables_passed_through: usize,
    pub files_copied: usize,
    pub tables_replicated: usize,
    /// The run ended early on a pattern that matched no files
    pub stopped_early: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            tables_transformed: 0,
            tables_passed_through: 0,
            files_copied: 0,
            tables_replicated: 0,
            stopped_early: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Result of binding one input descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Bound under this relation name
    Bound(String),
    /// Pattern matched nothing and was left out
    Skipped,
    /// Pattern matched nothing and the run must stop
    Stop,
}

/// Drives one simple or advanced run against a working set
pub struct QueryOrchestrator<'a> {
    engine: DuckDBEngine,
    data_dir: &'a DataDir,
    params: &'a Parameters,
    tables: Vec<InputTable>,
    files: Vec<InputFile>,
    /// Relations bound in this run, by name
    relations: BTreeMap<String, ResolvedBinding>,
}

impl<'a> QueryOrchestrator<'a> {
    /// Discover the inputs of a data directory
    pub fn new(
        engine: DuckDBEngine,
        data_dir: &'a DataDir,
        params: &'a Parameters,
    ) -> TransformResult<Self> {
        let tables = data_dir.input_tables()?;
        let files = data_dir.input_files()?;
        info!(
            "Found {} input table(s) and {} input file(s)",
            tables.len(),
            files.len()
        );
        Ok(Self {
            engine,
            data_dir,
            params,
            tables,
            files,
            relations: BTreeMap::new(),
        })
    }

    pub fn engine(&self) -> &DuckDBEngine {
        &self.engine
    }

    pub fn tables(&self) -> &[InputTable] {
        &self.tables
    }

    /// Relations bound so far
    pub fn relations(&self) -> &BTreeMap<String, ResolvedBinding> {
        &self.relations
    }

    /// Resolve a descriptor and bind it as a named relation
    ///
    /// `detect_types` applies to descriptors without a dtype mode. Simple mode
    /// takes it from the parameters, advanced mode always detects.
    pub fn bind(
        &mut self,
        descriptor: &InputTableDescriptor,
        detect_types: bool,
    ) -> TransformResult<BindOutcome> {
        let resolved = TableResolver::new(&self.tables, detect_types).resolve(descriptor);
        let binding = match resolved {
            Ok(binding) => binding,
            Err(TransformError::NoFilesMatched(pattern)) => {
                return match self.params.empty_pattern_policy {
                    EmptyPatternPolicy::Fail => Err(TransformError::NoFilesMatched(pattern)),
                    EmptyPatternPolicy::Skip => {
                        warn!("No files found that match the pattern {}, skipping", pattern);
                        Ok(BindOutcome::Skipped)
                    }
                    EmptyPatternPolicy::Stop => {
                        warn!(
                            "No files found that match the pattern {}, stopping the run",
                            pattern
                        );
                        Ok(BindOutcome::Stop)
                    }
                };
            }
            Err(e) => return Err(e),
        };

        let name = binding.destination_name.clone();
        if self.relations.contains_key(&name) {
            return Err(TransformError::Configuration(format!(
                "Relation {} is bound more than once",
                name
            )));
        }

        self.engine.register_csv(&binding)?;
        info!("Bound {} as {}", binding.matched_tables.join(", "), name);
        self.relations.insert(name.clone(), binding);
        Ok(BindOutcome::Bound(name))
    }

    /// Simple mode
    pub fn run_simple(&mut self) -> TransformResult<RunSummary> {
        let mut summary = RunSummary::new(Mode::Simple);
        let entries = self.params.simple_queries()?;
        let materializer =
            OutputMaterializer::new(self.data_dir.tables_out(), self.data_dir.scratch());

        for entry in &entries {
            match self.bind(&entry.input, self.params.detect_types)? {
                BindOutcome::Bound(_) => {}
                BindOutcome::Skipped => continue,
                BindOutcome::Stop => {
                    summary.stopped_early = true;
                    return Ok(summary.finish());
                }
            }
            materializer.materialize(&self.engine, &simple_output_spec(entry))?;
            summary.tables_transformed += 1;
        }

        let descriptors: Vec<&InputTableDescriptor> = entries.iter().map(|e| &e.input).collect();
        summary.tables_passed_through = self.pass_through_unmatched(&descriptors)?;
        summary.files_copied = self.copy_files()?;
        Ok(summary.finish())
    }

    /// Advanced mode
    pub fn run_advanced(&mut self) -> TransformResult<RunSummary> {
        let mut summary = RunSummary::new(Mode::Advanced);
        let statements = self.params.statements()?;
        let outputs = self
            .params
            .output
            .iter()
            .map(OutputDeclaration::to_spec)
            .collect::<TransformResult<Vec<_>>>()?;

        let params = self.params;
        let descriptors: Vec<InputTableDescriptor> = if params.input.is_empty() {
            self.tables
                .iter()
                .map(|t| InputTableDescriptor::ByName(t.name.clone()))
                .collect()
        } else {
            params.input.clone()
        };

        for descriptor in &descriptors {
            if self.bind(descriptor, true)? == BindOutcome::Stop {
                summary.stopped_early = true;
                return Ok(summary.finish());
            }
        }

        for (i, statement) in statements.iter().enumerate() {
            info!("Executing statement {} of {}", i + 1, statements.len());
            self.engine.execute(statement)?;
        }

        let passthrough_filter: Vec<&InputTableDescriptor> = params.input.iter().collect();
        summary.tables_passed_through = self.pass_through_unmatched(&passthrough_filter)?;

        let materializer =
            OutputMaterializer::new(self.data_dir.tables_out(), self.data_dir.scratch());
        for spec in &outputs {
            materializer.materialize(&self.engine, spec)?;
            summary.tables_transformed += 1;
        }

        summary.files_copied = self.copy_files()?;
        Ok(summary.finish())
    }

    /// Copy every table not covered by any descriptor
    fn pass_through_unmatched(
        &self,
        descriptors: &[&InputTableDescriptor],
    ) -> TransformResult<usize> {
        let out_dir = self.data_dir.tables_out();
        let mut copied = 0;
        for table in &self.tables {
            if descriptors.iter().any(|d| d.matches(&table.name)) {
                continue;
            }
            passthrough::copy_table(table, &out_dir)?;
            copied += 1;
        }
        Ok(copied)
    }

    fn copy_files(&self) -> TransformResult<usize> {
        let out_dir = self.data_dir.files_out();
        for file in &self.files {
            passthrough::copy_file(file, &out_dir)?;
        }
        Ok(self.files.len())
    }
}

/// Output of a simple-mode entry
///
/// The destination is the output's destination, else the input's relation
/// name, else the input name or pattern; the file is named after it.
pub fn simple_output_spec(entry: &QueryEntry) -> OutputTableSpec {
    let input_destination = entry
        .input
        .destination()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| entry.input.pattern())
        .to_string();

    let (destination, incremental, primary_key) = match &entry.output {
        Some(OutputDeclaration::ByName(name)) if !name.is_empty() => {
            (name.clone(), false, Vec::new())
        }
        Some(OutputDeclaration::Structured(spec)) => (
            spec.destination
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or(input_destination),
            spec.incremental,
            spec.primary_key.clone(),
        ),
        _ => (input_destination, false, Vec::new()),
    };

    OutputTableSpec {
        source: OutputSource::Query(entry.query.clone()),
        table_name: destination.clone(),
        destination: Some(destination),
        incremental,
        primary_key,
    }
}

/// Run the configured mode against a data directory
pub fn run(data_dir: &DataDir) -> TransformResult<RunSummary> {
    let params = Parameters::load(data_dir.root())?;
    info!("Running in {} mode", params.mode);
    if params.debug {
        info!("Parameters: {:?}", params);
    }

    let summary = match params.mode {
        Mode::Replicate => run_replication(data_dir, &params)?,
        Mode::Simple | Mode::Advanced => {
            data_dir.ensure_output_dirs()?;
            let engine = DuckDBEngine::working_set(&EngineSettings::from_env())?;
            let mut orchestrator = QueryOrchestrator::new(engine, data_dir, &params)?;
            if params.mode == Mode::Advanced {
                orchestrator.run_advanced()?
            } else {
                orchestrator.run_simple()?
            }
        }
    };

    if summary.stopped_early {
        warn!("Run stopped early; remaining inputs were not processed");
    }
    info!(
        "Run finished: {} transformed, {} passed through, {} file(s) copied, {} replicated",
        summary.tables_transformed,
        summary.tables_passed_through,
        summary.files_copied,
        summary.tables_replicated
    );
    Ok(summary)
}

fn run_replication(data_dir: &DataDir, params: &Parameters) -> TransformResult<RunSummary> {
    let mut summary = RunSummary::new(Mode::Replicate);
    let database = params.require_database()?;
    let token = std::env::var(ENV_MOTHERDUCK_TOKEN).map_err(|_| {
        TransformError::Configuration(
            "Warehouse token could not be retrieved from environment.".to_string(),
        )
    })?;

    let replication = ReplicationEngine::connect(database, &token, params.schema.clone())?;
    let tables = data_dir.input_tables()?;
    summary.tables_replicated = replication.replicate_all(&tables)?.len();
    Ok(summary.finish())
}
