//! Batch orchestration over a run directory.
//!
//! A batch goes through two pooled stages: every `.apsim` simulation
//! definition is translated to a runnable `.sim` unit, then every unit is
//! executed with bounded retry. Afterwards the daily output files are
//! parsed into the per-run SQLite store, all outputs are archived, and the
//! intermediates are removed.

use crate::archive::{archive_files, Compression};
use crate::binary::{CompletionCheck, ModelBinary};
use crate::pool::{effective_workers, run_pool};
use crate::progress::{format_hms, StageProgress};
use crate::RunResult;
use ag_output::read_output_file;
use ag_store::save_output_tables;
use glob::glob;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Executions of one unit before it is abandoned.
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker threads per stage. `None` uses every logical CPU.
    pub workers: Option<usize>,
    /// File name of the per-run SQLite store, created in the run directory.
    pub db_name: String,
    /// Base file name of the output archive, before the compression suffix.
    pub archive_name: String,
    pub compression: Compression,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            workers: None,
            db_name: "apsimData.sqlite".to_string(),
            archive_name: "apsimData.tar".to_string(),
            compression: Compression::Gzip,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub started: String,
    pub ended: String,
    pub definitions: usize,
    pub units: usize,
    pub abandoned: Vec<PathBuf>,
    pub conversion_secs: Option<f64>,
    pub average_unit_secs: f64,
    pub database_rows: Option<usize>,
    pub database_secs: Option<f64>,
    pub archive: Option<PathBuf>,
    pub archive_secs: Option<f64>,
    pub total_secs: f64,
}

#[derive(Debug, Default)]
pub struct StageReport {
    pub abandoned: Vec<PathBuf>,
    pub average_secs: f64,
}

#[derive(Debug, Default)]
pub struct PostRunReport {
    pub database_rows: Option<usize>,
    pub database_secs: Option<f64>,
    pub archive: Option<PathBuf>,
    pub archive_secs: Option<f64>,
}

/// Run the full batch in `dir` and print a summary block. If runnable
/// units are already present the translation stage is skipped, so an
/// interrupted batch resumes where it stopped.
pub fn run_batch(dir: &Path, binary: &ModelBinary, options: &RunOptions) -> RunResult<BatchSummary> {
    let started = Instant::now();
    let workers = effective_workers(options.workers);
    let mut summary = BatchSummary {
        started: timestamp(),
        ..BatchSummary::default()
    };

    let mut units = sorted_glob(dir, "*.sim")?;
    if !units.is_empty() {
        println!(
            "** {} runnable unit(s) already present, resuming execution",
            units.len()
        );
    } else {
        let definitions = sorted_glob(dir, "*.apsim")?;
        summary.definitions = definitions.len();
        info!(
            "translating {} simulation definitions on {} workers",
            definitions.len(),
            workers
        );
        let conversion_started = Instant::now();
        convert_stage(&definitions, binary, workers);
        summary.conversion_secs = Some(conversion_started.elapsed().as_secs_f64());
        units = sorted_glob(dir, "*.sim")?;
    }

    summary.units = units.len();
    info!("executing {} units on {} workers", units.len(), workers);
    let report = execute_stage(&units, binary, workers);
    summary.average_unit_secs = report.average_secs;
    summary.abandoned = report.abandoned;

    let post = post_process(dir, options)?;
    summary.database_rows = post.database_rows;
    summary.database_secs = post.database_secs;
    summary.archive = post.archive;
    summary.archive_secs = post.archive_secs;

    summary.ended = timestamp();
    summary.total_secs = started.elapsed().as_secs_f64();
    print_summary(&summary);
    Ok(summary)
}

/// Translate every definition in parallel. Failures are logged per file
/// and do not stop the stage.
pub fn convert_stage(definitions: &[PathBuf], binary: &ModelBinary, workers: usize) {
    let progress = Mutex::new(StageProgress::new(definitions.len(), workers));
    run_pool(definitions.to_vec(), workers, |path: PathBuf| {
        if let Err(err) = binary.convert(&path) {
            warn!("failed to translate {}: {}", path.display(), err);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.lock().unwrap().note_converted(&name);
    });
}

/// Execute every unit in parallel, retrying each up to `MAX_ATTEMPTS`
/// times. A completed unit's `.sim` file is removed; an abandoned unit is
/// reported once and keeps its file for manual inspection.
pub fn execute_stage(units: &[PathBuf], binary: &ModelBinary, workers: usize) -> StageReport {
    let progress = Mutex::new(StageProgress::new(units.len(), workers));
    let abandoned = Mutex::new(Vec::new());

    run_pool(units.to_vec(), workers, |path: PathBuf| {
        let unit_started = Instant::now();
        let mut completed = false;
        for _ in 0..MAX_ATTEMPTS {
            match binary.execute(&path) {
                Ok(tail) if binary.is_complete(&tail) => {
                    completed = true;
                    break;
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!("failed to execute {}: {}", path.display(), err);
                    break;
                }
            }
        }
        if completed {
            if let Err(err) = fs::remove_file(&path) {
                warn!("could not remove {}: {}", path.display(), err);
            }
        } else {
            warn!("unable to process {}", path.display());
            abandoned.lock().unwrap().push(path.clone());
        }
        progress.lock().unwrap().note_executed(unit_started.elapsed());
    });

    let progress = progress.into_inner().unwrap();
    StageReport {
        abandoned: abandoned.into_inner().unwrap(),
        average_secs: progress.average_secs(),
    }
}

/// Persist, archive, and clean up after the execution stage. With no daily
/// output files the store step is skipped and only the summaries are
/// archived; with no output at all nothing happens.
pub fn post_process(dir: &Path, options: &RunOptions) -> RunResult<PostRunReport> {
    let outputs = sorted_glob(dir, "*.out")?;
    let summaries = sorted_glob(dir, "*.sum")?;
    if outputs.is_empty() && summaries.is_empty() {
        warn!("no output files found in {}, nothing to save", dir.display());
        return Ok(PostRunReport::default());
    }

    let mut report = PostRunReport::default();
    if outputs.is_empty() {
        warn!("no daily output files found, archiving summaries only");
    } else {
        let save_started = Instant::now();
        let mut tables = Vec::with_capacity(outputs.len());
        for path in &outputs {
            match read_output_file(path) {
                Ok(table) => tables.push(table),
                Err(err) => {
                    warn!("failed to parse {}: {}", path.display(), err);
                    tables.push(Default::default());
                }
            }
        }
        let rows = save_output_tables(&dir.join(&options.db_name), &tables)?;
        report.database_rows = Some(rows);
        report.database_secs = Some(save_started.elapsed().as_secs_f64());
    }

    let archive_started = Instant::now();
    let mut members = outputs;
    members.extend(summaries);
    report.archive = Some(archive_files(
        &members,
        &dir.join(&options.archive_name),
        options.compression,
    )?);
    report.archive_secs = Some(archive_started.elapsed().as_secs_f64());

    for pattern in ["*.tmp", "*.out", "*.sum"] {
        for path in sorted_glob(dir, pattern)? {
            if let Err(err) = fs::remove_file(&path) {
                warn!("could not remove {}: {}", path.display(), err);
            }
        }
    }
    Ok(report)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_summary(summary: &BatchSummary) {
    let line = "=".repeat(40);
    println!("{}", line);
    println!("Run summary");
    println!("{}", line);
    println!("Started               : {}", summary.started);
    println!("Ended                 : {}", summary.ended);
    if let Some(secs) = summary.conversion_secs {
        println!("Translation time      : {}", format_hms(secs));
    }
    println!("Units executed        : {}", summary.units);
    println!(
        "Average time per unit : {}",
        format_hms(summary.average_unit_secs)
    );
    if !summary.abandoned.is_empty() {
        println!("Abandoned units       : {}", summary.abandoned.len());
        for path in &summary.abandoned {
            println!("  {}", path.display());
        }
    }
    if let Some(rows) = summary.database_rows {
        println!("Daily rows saved      : {}", rows);
    }
    if let Some(secs) = summary.database_secs {
        println!("Database time         : {}", format_hms(secs));
    }
    if let Some(path) = &summary.archive {
        println!("Archive               : {}", path.display());
    }
    if let Some(secs) = summary.archive_secs {
        println!("Archive time          : {}", format_hms(secs));
    }
    println!("Total time            : {}", format_hms(summary.total_secs));
    println!("{}", line);
}

fn sorted_glob(dir: &Path, pattern: &str) -> RunResult<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let mut files: Vec<PathBuf> = glob(&full.to_string_lossy())?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("unreadable path while scanning run directory: {}", err);
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}
