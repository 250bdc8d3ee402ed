use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::Value as JsonValue;
use sqlw::{Database, DatabaseConfig, SqlwError};
use tracing::Level;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a named query from a sqlw configuration")]
struct Args {
    /// JSON configuration naming the database file and its queries
    #[arg(long, short)]
    config: PathBuf,
    /// Query to run
    #[arg(long, short, required_unless_present = "list")]
    query: Option<String>,
    /// Request document supplying the query parameters
    #[arg(long, short, default_value = "{}")]
    request: String,
    /// List the configured queries and exit
    #[arg(long)]
    list: bool,
    /// Pretty-print the response document
    #[arg(long)]
    pretty: bool,
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(Level::from(args.log_level))
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("sqlw: {err}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the query succeeded.
fn run(args: &Args) -> Result<bool, SqlwError> {
    let config = DatabaseConfig::from_path(&args.config)?;
    let db = Database::open(&config)?;

    if args.list {
        for name in db.query_names() {
            let description = db.query(name).map(|q| q.description()).unwrap_or_default();
            println!("{name}\t{description}");
        }
        return Ok(true);
    }

    let request: JsonValue = serde_json::from_str(&args.request)?;
    let name = args.query.as_deref().unwrap_or_default();
    let response = db.execute(name, &request);
    let doc = response.to_json();
    let text = if args.pretty {
        serde_json::to_string_pretty(&doc)?
    } else {
        doc.to_string()
    };
    println!("{text}");
    Ok(response.is_success())
}
