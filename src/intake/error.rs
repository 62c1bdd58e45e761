use crate::services::ServiceError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures of one intake dispatch.
///
/// None of these stop the coordinator; they are logged, recorded in the error log
/// and the item is quarantined to Staging where applicable.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// No handler applies; the item is quarantined
    #[error("No handler found for {0}")]
    ClassificationMiss(String),

    /// A converter failed and the original was used instead
    #[error("Conversion failed for {file}: {reason}")]
    ConversionFailure { file: String, reason: String },

    /// Fatal for the item: the manifest could not be written or artifacts not relocated
    #[error("Could not package {name}: {source}")]
    ManifestOrRelocationFailure {
        name: String,
        #[source]
        source: ServiceError,
    },

    /// The path disappeared between settling and dispatch
    #[error("{0} vanished before it could be processed")]
    VanishedInput(Utf8PathBuf),

    #[error("Failed to extract {name}: {source}")]
    ExtractionFailed {
        name: String,
        #[source]
        source: ServiceError,
    },

    #[error("{0} contains no models or images")]
    EmptyProject(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The coordinator's command channel is closed
    #[error("Intake coordinator is not running")]
    CoordinatorUnavailable,
}

impl IntakeError {
    pub(crate) fn packaging(name: &str, source: impl Into<ServiceError>) -> Self {
        IntakeError::ManifestOrRelocationFailure {
            name: name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        IntakeError::Io {
            path: path.into(),
            source,
        }
    }
}
