//! Replication of input tables into a remote warehouse
//!
//! Each input table is mirrored into a warehouse table named after its stem.
//! Whether the table is replaced or appended to follows the incremental flag
//! of its manifest:
//!
//! | incremental | exists | id column | action |
//! |---|---|---|---|
//! | false | any | any | drop and recreate |
//! | true | no | any | create |
//! | true | yes | yes | append rows whose id is not present yet |
//! | true | yes | no | append everything |

use std::fmt;

use tracing::{info, warn};

use crate::database::{DuckDBEngine, quote_identifier, read_csv_sql};
use crate::error::{TransformError, TransformResult};
use crate::models::{ID_COLUMN, InputTable, InputTableDescriptor, ManifestInfo};
use crate::resolver::TableResolver;

/// What replication did to one warehouse table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationAction {
    /// Full load; `replaced` when an existing table was dropped first
    FullLoad { replaced: bool },
    /// First incremental load into a missing table
    InitialLoad,
    /// Incremental append skipping ids already present
    DedupAppend,
    /// Incremental append without deduplication
    Append,
}

impl fmt::Display for ReplicationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationAction::FullLoad { replaced: true } => write!(f, "full load (replaced)"),
            ReplicationAction::FullLoad { replaced: false } => write!(f, "full load"),
            ReplicationAction::InitialLoad => write!(f, "initial incremental load"),
            ReplicationAction::DedupAppend => write!(f, "incremental append with id dedup"),
            ReplicationAction::Append => write!(f, "incremental append"),
        }
    }
}

/// Decide the load strategy for one table
pub fn decide(info: &ManifestInfo, exists: bool) -> ReplicationAction {
    match (info.incremental, exists) {
        (false, replaced) => ReplicationAction::FullLoad { replaced },
        (true, false) => ReplicationAction::InitialLoad,
        (true, true) if info.has_id_column => ReplicationAction::DedupAppend,
        (true, true) => ReplicationAction::Append,
    }
}

/// Outcome of replicating one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatedTable {
    pub table: String,
    pub action: ReplicationAction,
}

/// Loads input tables into a warehouse schema over one connection
pub struct ReplicationEngine {
    warehouse: DuckDBEngine,
    schema: String,
}

impl ReplicationEngine {
    /// Use an already opened warehouse connection
    pub fn new(warehouse: DuckDBEngine, schema: impl Into<String>) -> Self {
        Self {
            warehouse,
            schema: schema.into(),
        }
    }

    /// Connect to a MotherDuck database
    pub fn connect(database: &str, token: &str, schema: impl Into<String>) -> TransformResult<Self> {
        if token.is_empty() {
            return Err(TransformError::Configuration(
                "Warehouse token could not be retrieved from environment.".to_string(),
            ));
        }
        let warehouse = DuckDBEngine::motherduck(database, token)?;
        info!("Connected to warehouse {}", warehouse.target());
        Ok(Self::new(warehouse, schema))
    }

    pub fn warehouse(&self) -> &DuckDBEngine {
        &self.warehouse
    }

    /// Whether the table exists in the target schema
    ///
    /// A failing catalog query counts as "does not exist".
    pub fn table_exists(&self, table: &str) -> bool {
        match self.warehouse.table_exists(&self.schema, table) {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Error checking if table '{}' exists: {}", table, e);
                false
            }
        }
    }

    /// Replicate every input table, stopping at the first failure
    pub fn replicate_all(&self, tables: &[InputTable]) -> TransformResult<Vec<ReplicatedTable>> {
        info!("Replicating {} input table(s)", tables.len());
        let resolver = TableResolver::new(tables, true);
        tables
            .iter()
            .map(|table| self.replicate_table(&resolver, table))
            .collect()
    }

    /// Replicate one input table
    pub fn replicate_table(
        &self,
        resolver: &TableResolver<'_>,
        table: &InputTable,
    ) -> TransformResult<ReplicatedTable> {
        let name = table.stem().to_string();
        let binding = resolver.resolve(&InputTableDescriptor::ByName(table.name.clone()))?;
        let source = format!("SELECT * FROM {}", read_csv_sql(&binding));

        let info = ManifestInfo::from_manifest(table.manifest.as_ref());
        let action = decide(&info, self.table_exists(&name));
        info!("Replicating {} into {}: {}", table.name, name, action);

        let target = self.qualified(&name);
        let sql = match action {
            ReplicationAction::FullLoad { .. } => format!(
                "DROP TABLE IF EXISTS {target}; CREATE TABLE {target} AS {source};"
            ),
            ReplicationAction::InitialLoad => format!("CREATE TABLE {target} AS {source};"),
            ReplicationAction::DedupAppend => {
                let staging = self.qualified(&format!("{}__staging", name));
                let id = quote_identifier(ID_COLUMN);
                format!(
                    "CREATE OR REPLACE TABLE {staging} AS {source}; \
                     INSERT INTO {target} SELECT * FROM {staging} s \
                     WHERE NOT EXISTS (SELECT 1 FROM {target} t WHERE t.{id} = s.{id}); \
                     DROP TABLE {staging};"
                )
            }
            ReplicationAction::Append => format!("INSERT INTO {target} {source};"),
        };

        self.in_transaction(&sql)
            .map_err(|e| TransformError::replication(&name, e))?;

        info!("Table '{}' replicated ({})", name, action);
        Ok(ReplicatedTable {
            table: name,
            action,
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(table))
    }

    /// Run statements atomically; roll back on failure
    fn in_transaction(&self, sql: &str) -> TransformResult<()> {
        self.warehouse.execute("BEGIN TRANSACTION;")?;
        match self.warehouse.execute(sql) {
            Ok(()) => self.warehouse.execute("COMMIT;"),
            Err(e) => {
                if let Err(rollback) = self.warehouse.execute("ROLLBACK;") {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}
