use ag_run::{post_process, run_batch, Compression, ModelBinary, RunOptions, RunResult};
use ag_store::update_master;
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ag-cli")]
#[command(about = "Batch driver for gridded crop-model simulations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate and execute every simulation in a run directory
    Run {
        /// Run directory containing .apsim simulation definitions
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Worker threads per stage (default: all logical CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Translator executable (default: ApsimToSim.exe next to this binary)
        #[arg(long)]
        convert_exe: Option<PathBuf>,
        /// Engine executable (default: Apsim.x next to this binary)
        #[arg(long)]
        model_exe: Option<PathBuf>,
        /// Wall-clock limit per child process, in seconds (default: none)
        #[arg(long)]
        timeout: Option<u64>,
        /// Archive compression: none, gz, or bz2
        #[arg(long, default_value = "gz")]
        compression: Compression,
        /// File name of the per-run SQLite store
        #[arg(long, default_value = "apsimData.sqlite")]
        db: String,
        /// Print the batch summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Parse, store, and archive output files already in a directory
    Import {
        /// Directory containing .out and .sum files
        dir: PathBuf,
        /// File name of the per-run SQLite store
        #[arg(long, default_value = "apsimData.sqlite")]
        db: String,
        /// Archive compression: none, gz, or bz2
        #[arg(long, default_value = "gz")]
        compression: Compression,
    },
    /// Fold per-run stores into the master experiment database
    UpdateMaster {
        /// Path to the master database (created if missing)
        master_db: PathBuf,
        /// CSV lookup of grid points (point_id plus metadata columns)
        grid_lut: PathBuf,
        /// First run number to fold in
        start_run: i64,
        /// Last run number (default: only the first)
        end_run: Option<i64>,
    },
}

fn main() -> RunResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            dir,
            jobs,
            convert_exe,
            model_exe,
            timeout,
            compression,
            db,
            json,
        } => cmd_run(&dir, jobs, convert_exe, model_exe, timeout, compression, db, json),
        Commands::Import {
            dir,
            db,
            compression,
        } => cmd_import(&dir, db, compression),
        Commands::UpdateMaster {
            master_db,
            grid_lut,
            start_run,
            end_run,
        } => cmd_update_master(&master_db, &grid_lut, start_run, end_run),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    dir: &Path,
    jobs: Option<usize>,
    convert_exe: Option<PathBuf>,
    model_exe: Option<PathBuf>,
    timeout: Option<u64>,
    compression: Compression,
    db: String,
    json: bool,
) -> RunResult<()> {
    let mut binary = ModelBinary::new(
        convert_exe.unwrap_or_else(|| default_exe("ApsimToSim.exe")),
        model_exe.unwrap_or_else(default_model_exe),
    );
    binary.timeout = timeout.map(Duration::from_secs);

    let options = RunOptions {
        workers: jobs,
        db_name: db,
        compression,
        ..RunOptions::default()
    };
    let summary = run_batch(dir, &binary, &options)?;
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(err) => tracing::warn!("could not serialize batch summary: {}", err),
        }
    } else if summary.abandoned.is_empty() {
        println!("✓ Batch completed");
    } else {
        println!(
            "Batch completed with {} abandoned unit(s)",
            summary.abandoned.len()
        );
    }
    Ok(())
}

fn cmd_import(dir: &Path, db: String, compression: Compression) -> RunResult<()> {
    let options = RunOptions {
        db_name: db,
        compression,
        ..RunOptions::default()
    };
    let report = post_process(dir, &options)?;
    match report.database_rows {
        Some(rows) => println!(
            "✓ Saved {} daily rows to {}",
            rows,
            dir.join(&options.db_name).display()
        ),
        None => println!("No daily output files found in {}", dir.display()),
    }
    if let Some(archive) = report.archive {
        println!("✓ Archived outputs to {}", archive.display());
    }
    Ok(())
}

fn cmd_update_master(
    master_db: &Path,
    grid_lut: &Path,
    start_run: i64,
    end_run: Option<i64>,
) -> RunResult<()> {
    update_master(master_db, grid_lut, start_run, end_run)?;
    println!("✓ Master database updated: {}", master_db.display());
    Ok(())
}

/// Model executables ship alongside this binary by default.
fn default_exe(name: &str) -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn default_model_exe() -> PathBuf {
    if cfg!(windows) {
        default_exe("Apsim.exe")
    } else {
        default_exe("Apsim.x")
    }
}
