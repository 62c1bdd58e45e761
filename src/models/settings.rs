use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings, read once at startup.
///
/// Sources are layered by [`crate::config::load_settings`]: built-in defaults,
/// then an optional YAML file, then `MANYFOLD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Watched drop folder
    pub input_dir: Utf8PathBuf,

    /// Holding area used while automatic processing is off or blocked
    pub staging_dir: Utf8PathBuf,

    /// Root of the per-item output folders
    pub output_dir: Utf8PathBuf,

    /// Where `config.yaml` (auto_process, theme) is persisted
    pub config_dir: Utf8PathBuf,

    pub log_dir: Utf8PathBuf,

    /// Quiescence window before a path counts as settled
    pub settle_seconds: f64,

    /// How often the debounce registry is scanned
    pub poll_interval_ms: u64,

    /// Use notify's polling backend (bind mounts, network shares)
    pub use_polling_watcher: bool,

    /// External STL to 3MF converter. When unset only the built-in converter runs.
    pub geometry_command: Option<String>,

    /// External image converter producing WebP
    pub image_command: Option<String>,

    pub conversion_timeout_secs: u64,

    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: Utf8PathBuf::from("/input"),
            staging_dir: Utf8PathBuf::from("/staging"),
            output_dir: Utf8PathBuf::from("/output"),
            config_dir: Utf8PathBuf::from("/config"),
            log_dir: Utf8PathBuf::from("logs"),
            settle_seconds: 5.0,
            poll_interval_ms: 500,
            use_polling_watcher: false,
            geometry_command: None,
            image_command: Some("cwebp".to_string()),
            conversion_timeout_secs: 300,
            debug_mode: false,
        }
    }
}

impl Settings {
    pub fn settle_window(&self) -> Duration {
        Duration::from_secs_f64(self.settle_seconds.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }
}
