//! CLI binary entry point for table-transformer

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use table_transformer::data_dir::{DEFAULT_DATA_DIR, ENV_DATA_DIR};
use table_transformer::error::EXIT_INTERNAL_ERROR;
use table_transformer::{DataDir, TransformError, type_map};

#[derive(Parser)]
#[command(name = "table-transformer")]
#[command(about = "SQL transformations over CSV tables with manifest-aware outputs")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Debug logging for this crate
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured transformation or replication
    Run {
        /// Data directory holding config.json, in/ and out/
        #[arg(long, env = ENV_DATA_DIR, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
    /// Print the canonical type for engine type names
    DescribeTypes {
        /// Engine type names, e.g. BIGINT or "DECIMAL(18,3)"
        #[arg(required = true)]
        types: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.debug);

    let result = match cli.command {
        Commands::Run { data_dir } => handle_run(data_dir),
        Commands::DescribeTypes { types } => {
            for native in types {
                println!("{}\t{}", native, type_map::canonical_type(&native));
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = e
                .downcast_ref::<TransformError>()
                .map(TransformError::exit_code)
                .unwrap_or(EXIT_INTERNAL_ERROR);
            ExitCode::from(code as u8)
        }
    }
}

fn handle_run(data_dir: PathBuf) -> anyhow::Result<()> {
    let data_dir = DataDir::new(data_dir);
    let summary = table_transformer::run(&data_dir)?;
    let report = serde_json::to_string(&summary).context("Failed to serialize run summary")?;
    tracing::debug!("Run summary: {}", report);
    Ok(())
}
