//! ag-run: batch execution of the external crop-simulation binary.
//!
//! Drives the two-stage pipeline (translate each simulation definition to
//! its runnable form, then execute it) over a bounded pool of worker
//! threads, with per-unit retry, progress reporting, and post-run
//! persistence, archiving, and cleanup.

pub mod archive;
pub mod binary;
pub mod pool;
pub mod progress;
pub mod supervisor;

pub use archive::{archive_files, Compression};
pub use binary::{CompletionCheck, ModelBinary};
pub use supervisor::{post_process, run_batch, BatchSummary, RunOptions};

pub type RunResult<T> = Result<T, RunError>;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<ag_store::StoreError> for RunError {
    fn from(err: ag_store::StoreError) -> Self {
        RunError::Store(err.to_string())
    }
}
