//! ag-store: SQLite persistence for simulation output.
//!
//! Two stores: the per-run store written straight from parsed output files
//! (`sink`), and the master run database aggregating every run's yearly
//! records (`master`).

pub mod config;
pub mod dates;
pub mod master;
pub mod sink;

pub use config::RunConfig;
pub use master::{update_master, MasterDb};
pub use sink::save_output_tables;

use std::path::PathBuf;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Grid lookup error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Aggregation error: {0}")]
    Yearly(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Run database not found under {path}")]
    RunDbNotFound { path: PathBuf },

    #[error("Grid lookup table has no {column} column")]
    GridColumnMissing { column: &'static str },
}

impl From<ag_yearly::YearlyError> for StoreError {
    fn from(err: ag_yearly::YearlyError) -> Self {
        StoreError::Yearly(err.to_string())
    }
}
