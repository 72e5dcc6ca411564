// signal-export: convert a Signal backup into an SMS Backup & Restore document.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use signal_export_core::exporter::{self, ExportStats};
use signal_export_core::{diagnostics, ExportConfig, SortOrder};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "signal-export")]
#[command(about = "Export Signal messages to an XML file compatible with SMS Backup & Restore", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output document path
    #[arg(short, long, global = true, default_value = signal_export_core::config::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Record order by timestamp (asc or desc)
    #[arg(long, global = true, default_value = "desc")]
    order: SortOrder,

    /// Directory for the sanitized diagnostics log
    #[arg(long, global = true)]
    diagnostics_dir: Option<PathBuf>,

    /// Make logging more verbose
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt a .backup file with signalbackup-tools and export it
    Backup {
        /// Backup file
        #[arg(short, long, env = "SIG_FILE")]
        input: Option<PathBuf>,
        /// 30-digit backup passphrase
        #[arg(short, long, env = "SIG_KEY", hide_env_values = true)]
        passphrase: Option<String>,
        /// Extraction tool binary
        #[arg(long, default_value = signal_export_core::config::DEFAULT_TOOL)]
        tool: PathBuf,
        /// Keep the extraction directory for inspection
        #[arg(long)]
        keep_scratch: bool,
    },
    /// Export an already extracted database and attachment directory
    Extracted {
        /// Decrypted database.sqlite
        #[arg(long)]
        database: PathBuf,
        /// Directory holding Attachment_*.bin files (defaults to the database's directory)
        #[arg(long)]
        frames: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = ExportConfig {
        output_path: cli.output.clone(),
        order: cli.order,
        ..ExportConfig::default()
    };
    let diagnostics_dir = cli.diagnostics_dir.clone();
    log_diagnostic(&diagnostics_dir, "export_start", "export requested");

    let progress = |msg: &str| info!("{}", msg);
    let result = match cli.command {
        Commands::Backup {
            input,
            passphrase,
            tool,
            keep_scratch,
        } => {
            let input = match input {
                Some(input) => input,
                None => bail!("missing backup file, pass --input or set SIG_FILE (e.g. signal-2022-01-01-01-01-01.backup)"),
            };
            let passphrase = match passphrase {
                Some(passphrase) => passphrase,
                None => bail!("missing passphrase, pass --passphrase or set SIG_KEY (30 digits)"),
            };
            config.tool_path = tool;
            config.keep_scratch = keep_scratch;
            exporter::plan_export_with_progress(&input, &passphrase, progress)
                .and_then(|plan| exporter::export_backup_with_progress(&plan, &config, progress))
        }
        Commands::Extracted { database, frames } => {
            let frames = match frames {
                Some(frames) => frames,
                None => database
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            };
            exporter::export_extracted(&database, &frames, &config, &progress)
        }
    };

    let stats = match result {
        Ok(stats) => stats,
        Err(err) => {
            log_diagnostic(&diagnostics_dir, "export_error", &err.to_string());
            return Err(err).context("export failed");
        }
    };

    report(&stats, &diagnostics_dir);
    let summary = stats.to_json();
    println!("{}", summary);
    log_diagnostic(&diagnostics_dir, "export_success", &summary);
    info!("Created: {}", config.output_path.display());
    info!("Install SMS Backup & Restore on the phone and restore from this file");
    Ok(())
}

fn report(stats: &ExportStats, diagnostics_dir: &Option<PathBuf>) {
    info!(
        rows = stats.rows_read,
        text = stats.text_rows,
        multimedia = stats.multimedia_rows,
        plain = stats.plain_rows,
        secure = stats.secure_rows,
        "messages read"
    );
    info!(
        written = stats.records_written,
        skipped = stats.system_events_skipped,
        failed = stats.failed(),
        "records written"
    );
    if let Some(dir) = diagnostics_dir {
        for failure in &stats.failures {
            if let Err(err) = diagnostics::log_record_failure(dir, failure) {
                warn!(error = %err, "could not write diagnostics");
                break;
            }
        }
    }
}

fn log_diagnostic(dir: &Option<PathBuf>, kind: &str, message: &str) {
    if let Some(dir) = dir {
        if let Err(err) = diagnostics::log_event(dir, kind, message) {
            warn!(error = %err, "could not write diagnostics");
        }
    }
}
