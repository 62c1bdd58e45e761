use serde::{Deserialize, Serialize};

/// Operator preferences persisted to `config.yaml`.
///
/// Stored as a flat key-value document and rewritten on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default)]
    pub auto_process: bool,

    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            auto_process: false,
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "light".to_string()
}

impl PersistedConfig {
    /// Apply the startup rule: unattended processing never resumes on its own.
    pub fn for_startup(mut self) -> Self {
        self.auto_process = false;
        self
    }
}
