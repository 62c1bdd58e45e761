use camino::Utf8PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the external collaborators
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Process exited with code {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Expected output was not produced: {0}")]
    OutputMissing(Utf8PathBuf),

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("Archive exceeds extraction limits: {0}")]
    ArchiveLimit(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}
