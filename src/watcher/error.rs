use camino::Utf8PathBuf;
use thiserror::Error;

/// Watcher start-up and subscription failures.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch {path}: {reason}")]
    PathWatchFailed { path: Utf8PathBuf, reason: String },

    #[error("Cannot prepare {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The coordinator stopped accepting settled paths
    #[error("Intake coordinator is not running")]
    CoordinatorUnavailable,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
