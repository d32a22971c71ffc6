//! Worker error types.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Why a background worker did not produce an output.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Missing job input: {0}")]
    MissingInput(&'static str),

    #[error("Invalid job input {name}: {reason}")]
    InvalidInput { name: &'static str, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job cancelled")]
    Cancelled,
}

impl From<WorkerError> for BridgeError {
    fn from(error: WorkerError) -> Self {
        match error {
            WorkerError::Io(e) => BridgeError::Io(e),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
