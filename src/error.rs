use std::path::PathBuf;
use thiserror::Error;

/// Process exit status for a successful run.
pub const EXIT_OK: u8 = 0;
/// Bad or missing command line arguments.
pub const EXIT_USAGE: u8 = 1;
/// The input audio file does not exist.
pub const EXIT_INPUT_NOT_FOUND: u8 = 2;
/// The external separator program could not be found or started.
pub const EXIT_MISSING_DEPENDENCY: u8 = 3;
/// The separation job itself failed.
pub const EXIT_JOB_FAILED: u8 = 4;

#[derive(Debug, Error)]
pub enum StemError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("separation engine failed: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Ort(#[from] ort::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl StemError {
    /// Exit status reported to the host for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StemError::InputNotFound(_) => EXIT_INPUT_NOT_FOUND,
            StemError::MissingDependency(_) => EXIT_MISSING_DEPENDENCY,
            _ => EXIT_JOB_FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
