//! Binary entry point for trustdb.
//!
//! A small operator tool over the store: inspect translations, run ad-hoc
//! statements against whichever backend the environment selects, and force a
//! snapshot flush.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use trustdb::observability::{self, LoggingConfig};
use trustdb::{Database, PostgresDialect, SqlRewriter, StoreConfig, Value};

/// trustdb - SQLite/PostgreSQL persistence for TrustChecker.
#[derive(Parser)]
#[command(name = "trustdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TRUSTDB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the PostgreSQL form of a SQLite statement.
    Translate {
        /// Statement in SQLite dialect.
        sql: String,
    },

    /// Run a statement and print the rows as JSON.
    Query {
        /// Statement in SQLite dialect.
        sql: String,

        /// Positional parameter: null, true, false, a number, or text.
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<Value>,
    },

    /// Run a statement for its side effects.
    Exec {
        /// Statement in SQLite dialect.
        sql: String,

        /// Positional parameter: null, true, false, a number, or text.
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<Value>,

        /// Treat SQL as a multi-statement batch (no parameters).
        #[arg(long, conflicts_with = "params")]
        batch: bool,
    },

    /// Show the selected backend and check that it answers.
    Status,

    /// Flush the embedded store to its snapshot file.
    Save,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = observability::init_logging(&LoggingConfig::from_env(cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "trustdb", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    if let Commands::Translate { sql } = &cli.command {
        cmd_translate(&config, sql);
        return Ok(());
    }

    let db = Database::connect(&config).context("connecting to store")?;
    let result = match cli.command {
        Commands::Query { sql, params } => cmd_query(&db, &sql, &params).await,
        Commands::Exec { sql, params, batch } => cmd_exec(&db, &sql, &params, batch).await,
        Commands::Status => cmd_status(&db, &config).await,
        Commands::Save => cmd_save(&db).await,
        Commands::Translate { .. } | Commands::Completions { .. } => Ok(()),
    };
    // Close regardless so the embedded store gets its final flush.
    let closed = db.close().await.context("closing store");
    result.and(closed)
}

/// Loads configuration from the given file, or the environment alone.
fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(StoreConfig::from_env()),
    }
}

/// Parses a CLI parameter. Anything that is not a keyword or a number is text.
fn parse_param(raw: &str) -> std::result::Result<Value, Infallible> {
    Ok(match raw {
        "null" | "NULL" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| raw.parse::<f64>().map(Value::Real))
            .unwrap_or_else(|_| Value::Text(raw.to_string())),
    })
}

fn cmd_translate(config: &StoreConfig, sql: &str) {
    let dialect = PostgresDialect::with_conflict_targets(config.conflict_targets.clone());
    println!("{}", dialect.rewrite(sql));
}

async fn cmd_query(db: &Database, sql: &str, params: &[Value]) -> Result<()> {
    let rows = db.all(sql, params).await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn cmd_exec(db: &Database, sql: &str, params: &[Value], batch: bool) -> Result<()> {
    if batch {
        db.exec(sql).await?;
        println!("Batch executed");
    } else {
        let changed = db.run(sql, params).await?;
        println!("{changed} row(s) affected");
    }
    Ok(())
}

async fn cmd_status(db: &Database, config: &StoreConfig) -> Result<()> {
    println!("Backend: {}", db.kind());
    match config.snapshot_path() {
        Some(path) if db.kind() == trustdb::BackendKind::Embedded => {
            println!("Snapshot: {}", path.display());
        },
        _ => {},
    }
    match db.ping().await {
        Ok(()) => println!("Status: ready"),
        Err(e) => {
            println!("Status: unavailable ({e})");
            return Err(e.into());
        },
    }
    Ok(())
}

async fn cmd_save(db: &Database) -> Result<()> {
    db.save().await?;
    println!("Saved");
    Ok(())
}
