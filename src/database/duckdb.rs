//! DuckDB connection wrapper
//!
//! Provides the working set of a run (an in-memory database with a bounded
//! resource budget) and the warehouse connection used by replication. All
//! calls are synchronous and run on the caller's thread.

use std::path::Path;

use duckdb::{Config, Connection, params};
use tracing::debug;

use super::{ColumnDescription, copy_to_csv_sql, quote_identifier, read_csv_sql, select_sql};
use crate::config::EngineSettings;
use crate::error::{TransformError, TransformResult};
use crate::models::{OutputSource, ResolvedBinding};

/// A single DuckDB connection
pub struct DuckDBEngine {
    /// Human-readable target, used in error messages
    target: String,
    connection: Connection,
}

impl DuckDBEngine {
    /// Create the in-memory working set with the given resource budget
    pub fn working_set(settings: &EngineSettings) -> TransformResult<Self> {
        let mut config = Config::default()
            .threads(settings.threads)
            .and_then(|c| c.max_memory(&settings.memory_limit))
            .map_err(|e| TransformError::engine("configure DuckDB", e))?;

        if let Some(dir) = &settings.temp_directory {
            std::fs::create_dir_all(dir).map_err(|e| TransformError::io(dir, e))?;
            config = config
                .with("temp_directory", &dir.display().to_string())
                .map_err(|e| TransformError::engine("configure DuckDB", e))?;
        }

        let connection = Connection::open_in_memory_with_flags(config)
            .map_err(|e| TransformError::engine("open in-memory DuckDB", e))?;

        Ok(Self {
            target: ":memory:".to_string(),
            connection,
        })
    }

    /// Create an in-memory working set with the engine's own defaults
    pub fn in_memory() -> TransformResult<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| TransformError::engine("open in-memory DuckDB", e))?;
        Ok(Self {
            target: ":memory:".to_string(),
            connection,
        })
    }

    /// Open a file-backed database
    pub fn open(path: impl AsRef<Path>) -> TransformResult<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path)
            .map_err(|e| TransformError::engine(format!("open {}", path.display()), e))?;
        Ok(Self {
            target: path.display().to_string(),
            connection,
        })
    }

    /// Connect to a MotherDuck database
    ///
    /// The token is passed as a connection option, never as part of the
    /// path, so it cannot show up in errors or logs.
    pub fn motherduck(database: &str, token: &str) -> TransformResult<Self> {
        let target = format!("md:{}", database);
        let config = Config::default()
            .with("motherduck_token", token)
            .map_err(|e| TransformError::replication(&target, e))?;
        let connection = Connection::open_with_flags(&target, config)
            .map_err(|e| TransformError::replication(&target, e))?;
        Ok(Self { target, connection })
    }

    /// Target this connection points at
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Execute one or more statements that return no rows
    pub fn execute(&self, sql: &str) -> TransformResult<()> {
        debug!("Executing on {}: {}", self.target, sql);
        self.connection
            .execute_batch(sql)
            .map_err(|e| TransformError::engine(sql, e))
    }

    /// Bind a resolved CSV input as a named view in the working set
    pub fn register_csv(&self, binding: &ResolvedBinding) -> TransformResult<()> {
        let sql = format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
            quote_identifier(&binding.destination_name),
            read_csv_sql(binding)
        );
        self.execute(&sql)
    }

    /// Column names and engine types of an output source, in result order
    ///
    /// Uses the engine's `DESCRIBE`; the data itself is never scanned.
    pub fn describe(&self, source: &OutputSource) -> TransformResult<Vec<ColumnDescription>> {
        let sql = format!("DESCRIBE {}", select_sql(source));
        let mut stmt = self
            .connection
            .prepare(&sql)
            .map_err(|e| TransformError::engine(&sql, e))?;

        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDescription {
                    name: row.get(0)?,
                    native_type: row.get(1)?,
                })
            })
            .map_err(|e| TransformError::engine(&sql, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransformError::engine(&sql, e))?;

        Ok(columns)
    }

    /// Copy an output source to a CSV file with a header row
    pub fn copy_to_csv(&self, source: &OutputSource, path: &Path) -> TransformResult<()> {
        self.execute(&copy_to_csv_sql(source, path))
    }

    /// Number of rows of a relation
    pub fn row_count(&self, relation: &str) -> TransformResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(relation));
        self.connection
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| TransformError::engine(&sql, e))
    }

    /// Whether a table exists in the given schema, per the catalog
    pub fn table_exists(&self, schema: &str, table: &str) -> TransformResult<bool> {
        let sql = "SELECT COUNT(*) FROM information_schema.tables \
                   WHERE table_name = ? AND table_schema = ?";
        let count: i64 = self
            .connection
            .query_row(sql, params![table, schema], |row| row.get(0))
            .map_err(|e| TransformError::engine(sql, e))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CsvOptions;
    use tempfile::tempdir;

    #[test]
    fn test_working_set_with_settings() {
        let dir = tempdir().unwrap();
        let settings = EngineSettings {
            threads: 2,
            memory_limit: "256MB".to_string(),
            temp_directory: Some(dir.path().join("spill")),
        };
        let engine = DuckDBEngine::working_set(&settings).unwrap();
        engine.execute("CREATE TABLE t AS SELECT 1 AS id").unwrap();
        assert_eq!(engine.row_count("t").unwrap(), 1);
        assert!(dir.path().join("spill").is_dir());
    }

    #[test]
    fn test_describe_keeps_result_order() {
        let engine = DuckDBEngine::in_memory().unwrap();
        let columns = engine
            .describe(&OutputSource::Query(
                "SELECT 1::BIGINT AS zeta, 'x' AS alpha, 1.5::DOUBLE AS mid".to_string(),
            ))
            .unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(columns[0].native_type, "BIGINT");
        assert_eq!(columns[1].native_type, "VARCHAR");
        assert_eq!(columns[2].native_type, "DOUBLE");
    }

    #[test]
    fn test_register_csv_and_copy() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("orders.csv");
        std::fs::write(&input, "id,amount\n1,10\n2,20\n").unwrap();

        let engine = DuckDBEngine::in_memory().unwrap();
        engine
            .register_csv(&ResolvedBinding {
                destination_name: "orders".to_string(),
                physical_paths: vec![input],
                header: None,
                has_header_in_file: true,
                dtype_overrides: None,
                all_varchar: true,
                options: CsvOptions::default(),
                matched_tables: vec!["orders.csv".to_string()],
            })
            .unwrap();
        assert_eq!(engine.row_count("orders").unwrap(), 2);

        let output = dir.path().join("out.csv");
        engine
            .copy_to_csv(&OutputSource::Relation("orders".to_string()), &output)
            .unwrap();
        let content = std::fs::read_to_string(&output).unwrap().replace('"', "");
        assert_eq!(content, "id,amount\n1,10\n2,20\n");
    }

    #[test]
    fn test_table_exists() {
        let dir = tempdir().unwrap();
        let engine = DuckDBEngine::open(dir.path().join("warehouse.duckdb")).unwrap();
        assert!(!engine.table_exists("main", "orders").unwrap());
        engine.execute("CREATE TABLE orders (id INTEGER)").unwrap();
        assert!(engine.table_exists("main", "orders").unwrap());
        assert!(!engine.table_exists("other", "orders").unwrap());
    }

    #[test]
    fn test_motherduck_errors_do_not_carry_token() {
        let token = "md-token-that-must-stay-private";
        match DuckDBEngine::motherduck("analytics", token) {
            Ok(engine) => assert_eq!(engine.target(), "md:analytics"),
            Err(err) => {
                assert!(matches!(
                    err,
                    TransformError::Replication { ref target, .. } if target == "md:analytics"
                ));
                assert!(!err.to_string().contains(token));
                assert!(!format!("{:?}", err).contains(token));
            }
        }
    }

    #[test]
    fn test_engine_error_carries_statement() {
        let engine = DuckDBEngine::in_memory().unwrap();
        let err = engine.execute("SELECT * FROM missing_table").unwrap_err();
        assert!(matches!(err, TransformError::Engine { .. }));
        assert!(err.to_string().contains("missing_table"));
    }
}
