use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tinydb::errors::Error;
use tinydb::repl;
use tinydb::storage::table::Table;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "tinydb",
    version = VERSION,
    about = "Tiny disk-backed key-value database."
)]
struct Cli {
    /// Path to the database file; created on first use.
    #[arg(env = "TINYDB_FILE")]
    file: PathBuf,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli.file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: PathBuf) -> Result<(), Error> {
    let mut table = Table::open(path)?;
    let result = repl::run(&mut table, io::stdin().lock(), io::stdout());
    table.close()?;
    result
}

/// Logs go to a file so stdout stays a clean command channel.
fn init_logging() {
    let path = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tinydb.log");

    if let Ok(file) = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
    {
        tracing_subscriber::fmt()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}
