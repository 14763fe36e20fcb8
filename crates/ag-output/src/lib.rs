//! ag-output: parser for the model binary's flat-file output.

pub mod parser;
pub mod table;

pub use parser::read_output_file;
pub use table::OutputTable;

pub type OutputResult<T> = Result<T, OutputError>;

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
