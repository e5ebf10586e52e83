//! End-to-end tests for simple and advanced runs over a data directory

use std::fs;
use std::path::Path;

use table_transformer::models::{CanonicalType, Manifest};
use table_transformer::{DataDir, Mode, TransformError, run};
use tempfile::TempDir;

fn data_dir(config: &str) -> (TempDir, DataDir) {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    fs::create_dir_all(data.tables_in()).unwrap();
    fs::create_dir_all(data.files_in()).unwrap();
    fs::write(dir.path().join("config.json"), config).unwrap();
    (dir, data)
}

fn write_table(data: &DataDir, name: &str, content: &str) {
    fs::write(data.tables_in().join(name), content).unwrap();
}

/// File content with CSV quoting removed
fn unquoted(path: &Path) -> String {
    fs::read_to_string(path).unwrap().replace('"', "")
}

fn read_manifest(path: &Path) -> Manifest {
    Manifest::read(&Manifest::sidecar_path(path)).unwrap()
}

mod simple_mode_tests {
    use super::*;

    #[test]
    fn test_unmatched_table_is_copied_verbatim() {
        let (_dir, data) = data_dir(r#"{"parameters": {}}"#);
        write_table(&data, "orders.csv", "id,amount\n1,10\n2,20\n");

        let summary = run(&data).unwrap();
        assert_eq!(summary.mode, Mode::Simple);
        assert_eq!(summary.tables_passed_through, 1);
        assert_eq!(summary.tables_transformed, 0);

        let output = data.tables_out().join("orders.csv");
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "id,amount\n1,10\n2,20\n"
        );
        let manifest = read_manifest(&output);
        assert_eq!(manifest.columns, vec!["id", "amount"]);
        assert_eq!(manifest.column_types["id"], CanonicalType::String);
        assert_eq!(manifest.column_types["amount"], CanonicalType::String);
    }

    #[test]
    fn test_query_output_and_passthrough() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {
                "detect_types": true,
                "queries": {"orders.csv": "SELECT id, amount FROM orders WHERE amount > 10"}
            }}"#,
        );
        write_table(&data, "orders.csv", "id,amount\n1,10\n2,20\n3,30\n");
        write_table(&data, "customers.csv", "id,name\n1,Ann\n");
        fs::write(data.files_in().join("notes.txt"), "hello").unwrap();

        let summary = run(&data).unwrap();
        assert_eq!(summary.tables_transformed, 1);
        assert_eq!(summary.tables_passed_through, 1);
        assert_eq!(summary.files_copied, 1);

        let output = data.tables_out().join("orders.csv");
        assert_eq!(unquoted(&output), "id,amount\n2,20\n3,30\n");
        assert!(fs::read_to_string(&output).unwrap().contains("\"2\",\"20\""));

        let manifest = read_manifest(&output);
        assert_eq!(manifest.columns, vec!["id", "amount"]);
        assert_eq!(manifest.column_types["id"], CanonicalType::Integer);
        assert_eq!(manifest.column_types["amount"], CanonicalType::Integer);
        assert_eq!(manifest.has_header, Some(true));

        assert!(data.tables_out().join("customers.csv").is_file());
        assert!(data.tables_out().join("customers.csv.manifest").is_file());
        assert_eq!(
            fs::read_to_string(data.files_out().join("notes.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_pattern_entry_unions_matched_tables() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {"queries": [
                {"input": {"input_pattern": "orders_*.csv", "duckdb_destination": "orders",
                           "column_names": ["id", "amount"]},
                 "query": "SELECT id, amount FROM orders ORDER BY id",
                 "output": {"kbc_destination": "all_orders", "primary_key": ["id"]}}
            ]}}"#,
        );
        write_table(&data, "orders_2023.csv", "1,10\n2,20\n");
        write_table(&data, "orders_2024.csv", "3,30\n");

        let summary = run(&data).unwrap();
        assert_eq!(summary.tables_transformed, 1);
        assert_eq!(summary.tables_passed_through, 0);

        let output = data.tables_out().join("all_orders.csv");
        let content = unquoted(&output);
        assert_eq!(content.lines().count(), 4);
        assert_eq!(content.lines().next(), Some("id,amount"));

        let manifest = read_manifest(&output);
        assert_eq!(manifest.primary_key, vec!["id"]);
        assert_eq!(manifest.destination.as_deref(), Some("all_orders"));
        assert!(!data.tables_out().join("orders_2023.csv").exists());
    }

    #[test]
    fn test_output_fed_back_as_input_is_stable() {
        let config = r#"{"parameters": {"queries": {"orders.csv": "SELECT * FROM orders"}}}"#;
        let (_first_dir, first) = data_dir(config);
        write_table(&first, "orders.csv", "id,amount\n1,10\n2,20\n");
        run(&first).unwrap();

        let (_second_dir, second) = data_dir(config);
        for name in ["orders.csv", "orders.csv.manifest"] {
            fs::copy(first.tables_out().join(name), second.tables_in().join(name)).unwrap();
        }
        run(&second).unwrap();

        let first_output = fs::read_to_string(first.tables_out().join("orders.csv")).unwrap();
        let second_output = fs::read_to_string(second.tables_out().join("orders.csv")).unwrap();
        assert_eq!(first_output, second_output);
        assert_eq!(
            read_manifest(&first.tables_out().join("orders.csv")).columns,
            read_manifest(&second.tables_out().join("orders.csv")).columns
        );
    }
}

mod empty_pattern_tests {
    use super::*;

    const QUERIES: &str = r#""queries": [
        {"input": {"input_pattern": "missing_*.csv", "duckdb_destination": "missing"},
         "query": "SELECT * FROM missing"},
        {"input": "orders.csv", "query": "SELECT * FROM orders"}
    ]"#;

    fn config(policy: &str) -> String {
        format!(
            r#"{{"parameters": {{"empty_pattern_policy": "{}", {}}}}}"#,
            policy, QUERIES
        )
    }

    #[test]
    fn test_stop_ends_run_cleanly() {
        let (_dir, data) = data_dir(&config("stop"));
        write_table(&data, "orders.csv", "id\n1\n");

        let summary = run(&data).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.tables_transformed, 0);
        assert!(!data.tables_out().join("orders.csv").exists());
    }

    #[test]
    fn test_skip_continues_with_remaining_entries() {
        let (_dir, data) = data_dir(&config("skip"));
        write_table(&data, "orders.csv", "id\n1\n");

        let summary = run(&data).unwrap();
        assert!(!summary.stopped_early);
        assert_eq!(summary.tables_transformed, 1);
        assert!(data.tables_out().join("orders.csv").is_file());
    }

    #[test]
    fn test_fail_is_user_error() {
        let (_dir, data) = data_dir(&config("fail"));
        write_table(&data, "orders.csv", "id\n1\n");

        let err = run(&data).unwrap_err();
        assert!(matches!(err, TransformError::NoFilesMatched(_)));
        assert_eq!(err.exit_code(), 1);
    }
}

mod advanced_mode_tests {
    use super::*;

    #[test]
    fn test_join_with_declared_output() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {
                "mode": "advanced",
                "input": ["orders.csv", "customers.csv"],
                "queries": ["CREATE TABLE joined AS SELECT o.id, c.name FROM orders o JOIN customers c ON o.id = c.id ORDER BY o.id"],
                "output": [{"source": "joined", "primary_key": ["id"], "incremental": true}]
            }}"#,
        );
        write_table(&data, "orders.csv", "id,amount\n1,10\n2,20\n");
        write_table(&data, "customers.csv", "id,name\n1,Ann\n2,Bob\n");
        write_table(&data, "untouched.csv", "a,b\n1,2\n");

        let summary = run(&data).unwrap();
        assert_eq!(summary.mode, Mode::Advanced);
        assert!(!data.scratch().join("joined.csv.tmp").exists());
        assert_eq!(summary.tables_transformed, 1);
        assert_eq!(summary.tables_passed_through, 1);

        let output = data.tables_out().join("joined.csv");
        let manifest = read_manifest(&output);
        assert_eq!(manifest.columns, vec!["id", "name"]);
        assert_eq!(manifest.primary_key, vec!["id"]);
        assert!(manifest.incremental);
        assert_eq!(unquoted(&output), "id,name\n1,Ann\n2,Bob\n");

        // Bound inputs without an output declaration stay intermediate
        assert!(!data.tables_out().join("orders.csv").exists());
        assert!(!data.tables_out().join("customers.csv").exists());
        assert!(data.tables_out().join("untouched.csv").is_file());
    }

    #[test]
    fn test_inputs_without_dtypes_mode_detect_types() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {
                "mode": "advanced",
                "input": ["orders.csv"],
                "queries": ["CREATE TABLE t AS SELECT * FROM orders"],
                "output": ["t"]
            }}"#,
        );
        write_table(&data, "orders.csv", "id,amount\n1,10\n");

        run(&data).unwrap();
        let manifest = read_manifest(&data.tables_out().join("t.csv"));
        assert_eq!(manifest.columns, vec!["id", "amount"]);
        assert_eq!(manifest.column_types["id"], CanonicalType::Integer);
        assert_eq!(manifest.column_types["amount"], CanonicalType::Integer);
    }

    #[test]
    fn test_statements_see_earlier_statements() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {
                "mode": "advanced",
                "input": [{"input_pattern": "orders.csv", "duckdb_destination": "src", "dtypes_mode": "all_varchar"}],
                "queries": [
                    "CREATE TABLE step1 AS SELECT CAST(amount AS INTEGER) AS amount FROM src",
                    "CREATE TABLE step2 AS SELECT SUM(amount) AS total FROM step1"
                ],
                "output": ["step2"]
            }}"#,
        );
        write_table(&data, "orders.csv", "id,amount\n1,10\n2,20\n");

        run(&data).unwrap();
        let output = data.tables_out().join("step2.csv");
        assert_eq!(unquoted(&output), "total\n30\n");
        assert_eq!(
            read_manifest(&output).column_types["total"],
            CanonicalType::Integer
        );
    }

    #[test]
    fn test_output_without_source_is_configuration_error() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {"mode": "advanced", "output": [{"incremental": true}]}}"#,
        );
        let err = run(&data).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
    }

    #[test]
    fn test_failing_statement_is_user_error() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {"mode": "advanced", "queries": ["SELECT * FROM nowhere"]}}"#,
        );
        let err = run(&data).unwrap_err();
        assert!(matches!(err, TransformError::Engine { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}

mod configuration_tests {
    use super::*;

    #[test]
    fn test_missing_table_is_not_found() {
        let (_dir, data) = data_dir(
            r#"{"parameters": {"queries": {"orders.csv": "SELECT * FROM orders"}}}"#,
        );
        let err = run(&data).unwrap_err();
        assert!(matches!(err, TransformError::NotFound(ref name) if name == "orders.csv"));
        assert_eq!(err.to_string(), "Table orders.csv not found.");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&DataDir::new(dir.path())).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
    }

    #[test]
    fn test_replication_requires_database() {
        let (_dir, data) = data_dir(r#"{"parameters": {"mode": "replicate"}}"#);
        let err = run(&data).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
    }
}
