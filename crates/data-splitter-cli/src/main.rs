//! data-splitter CLI - archive year-partitioned tables into per-year databases.

use clap::{Parser, Subcommand};
use data_splitter::{ArchiveError, Config, Orchestrator, RunSummary};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file used when the config does not name one.
const DEFAULT_LOG_PATH: &str = "logs/data-splitter.log";

#[derive(Parser)]
#[command(name = "data-splitter")]
#[command(about = "Archive year-partitioned tables into per-year databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log verbosity: trace, debug, info, warn, error (LOG_LEVEL takes precedence)
    #[arg(long)]
    verbosity: Option<String>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log to stderr instead of the log file
    #[arg(long)]
    no_log_file: bool,

    /// JSON checkpoint file recording per-batch progress
    #[arg(long)]
    checkpoint_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every enabled table for every configured year
    Run {
        /// Log the plan without opening any connection
        #[arg(long)]
        dry_run: bool,

        /// Only archive these tables (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Only archive these years (repeatable)
        #[arg(long = "year")]
        years: Vec<i32>,

        /// Skip this many source rows of every table-year
        #[arg(long)]
        resume_offset: Option<u64>,
    },

    /// Compare source and archive row counts without copying
    Validate,

    /// Show working directory, config path and log path
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            match e.fatal_cause() {
                Some(cause) => eprintln!("FATAL: {}", cause),
                None => eprintln!("{}", e.format_detailed()),
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, ArchiveError> {
    let cli = Cli::parse();

    // Info works without a valid config
    if let Commands::Info = cli.command {
        print_info(&cli);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(&cli.config)?;
    if let Some(path) = &cli.checkpoint_file {
        config.processing.checkpoint_file = Some(path.clone());
    }

    let _guard = setup_logging(&cli, &config);
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Info => unreachable!(), // Handled above
        Commands::Run {
            dry_run,
            tables,
            years,
            resume_offset,
        } => {
            apply_run_overrides(&mut config, dry_run, &tables, &years, resume_offset)?;

            let orchestrator = Orchestrator::new(config)?;
            let summary = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config)?;
            let reports = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                println!("Validation Results:");
                for r in &reports {
                    let counts = match (r.source_count, r.archive_count) {
                        (Some(s), Some(a)) => format!("source {}, archive {}", s, a),
                        _ => r.error.clone().unwrap_or_default(),
                    };
                    let status = if r.passed { "OK" } else { "FAILED" };
                    println!("  {} {} {} ({}): {}", status, r.table, r.year, r.archive_database, counts);
                }
            }

            if reports.iter().any(|r| !r.passed) {
                return Ok(ExitCode::from(1));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Apply `run` command flags on top of the loaded configuration.
fn apply_run_overrides(
    config: &mut Config,
    dry_run: bool,
    tables: &[String],
    years: &[i32],
    resume_offset: Option<u64>,
) -> Result<(), ArchiveError> {
    if dry_run {
        config.archive.options.dry_run = true;
    }

    if !tables.is_empty() {
        if let Some(unknown) = tables
            .iter()
            .find(|name| !config.tables.iter().any(|t| &t.name == *name))
        {
            return Err(ArchiveError::Config(format!(
                "table '{}' is not in the configuration",
                unknown
            )));
        }
        for table in &mut config.tables {
            table.enabled = tables.contains(&table.name);
        }
    }

    if !years.is_empty() {
        config.archive.years = years.to_vec();
    }

    if let Some(offset) = resume_offset {
        config.archive.options.resume_offset = offset;
    }

    config.validate()
}

fn print_summary(summary: &RunSummary) {
    // stdout carries PROGRESS/FINAL lines only
    let status_msg = if summary.skipped_dry_run > 0 {
        "Dry run completed!"
    } else {
        "Archive completed!"
    };
    eprintln!("\n{}", status_msg);
    eprintln!("  Run ID: {}", summary.run_id);
    eprintln!("  Duration: {:.2}s", summary.duration_seconds);
    eprintln!(
        "  Table-years: {}/{}",
        summary.succeeded, summary.table_years_total
    );
    eprintln!("  Rows archived: {}", summary.rows_archived);
    eprintln!("  Rows pruned: {}", summary.rows_pruned);
    for f in &summary.failed {
        eprintln!("  Failed: {} {}: {}", f.table, f.year, f.error);
    }
}

fn print_info(cli: &Cli) {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("<unavailable: {}>", e));
    let log_path = Config::load(&cli.config)
        .ok()
        .and_then(|c| c.processing.log_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));

    println!("Working directory: {}", cwd);
    println!(
        "Config file: {}{}",
        cli.config.display(),
        if cli.config.exists() { "" } else { " (not found)" }
    );
    if cli.no_log_file {
        println!("Log output: stderr");
    } else {
        println!("Log file: {}", log_path.display());
    }
}

/// Level from LOG_LEVEL, then --verbosity, then the config, then info.
fn log_level(cli: &Cli, config: &Config) -> String {
    std::env::var("LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| cli.verbosity.clone())
        .or_else(|| config.processing.log_level.clone())
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase()
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Logs go to the log file, or to stderr when
/// file logging is off or the file cannot be opened.
fn setup_logging(cli: &Cli, config: &Config) -> WorkerGuard {
    let level = log_level(cli, config);
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = config
        .processing
        .log_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));

    let mut fallback = None;
    let (writer, guard) = if cli.no_log_file {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        match open_log_file(&log_path) {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                fallback = Some(e);
                tracing_appender::non_blocking(std::io::stderr())
            }
        }
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    if cli.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }

    if let Some(e) = fallback {
        warn!(
            "Cannot open log file {}: {}; logging to stderr",
            log_path.display(),
            e
        );
    }
    guard
}
