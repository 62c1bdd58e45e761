use crate::models::{PersistedConfig, Settings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;

/// Environment variable naming an optional YAML settings file
pub const SETTINGS_FILE_ENV: &str = "MANYFOLD_SETTINGS";

/// Prefix for per-field overrides, e.g. `MANYFOLD_INPUT_DIR`
pub const ENV_PREFIX: &str = "MANYFOLD";

const DEFAULT_SETTINGS_FILE: &str = "manyfold.yaml";

/// Load runtime settings from defaults, the settings file and the environment.
///
/// The file is taken from `MANYFOLD_SETTINGS` (default `manyfold.yaml`) and is
/// optional.
pub fn load_settings() -> Result<Settings> {
    let file =
        std::env::var(SETTINGS_FILE_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.to_string());
    load_settings_from(Some(Utf8Path::new(&file)), None)
}

/// Layered settings load with explicit sources.
///
/// `env_override` replaces the process environment; tests use it to avoid
/// touching global state.
pub fn load_settings_from(
    file: Option<&Utf8Path>,
    env_override: Option<HashMap<String, String>>,
) -> Result<Settings> {
    let mut builder = config::Config::builder();

    if let Some(file) = file {
        builder = builder.add_source(
            config::File::new(file.as_str(), config::FileFormat::Yaml).required(false),
        );
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(env_override),
    );

    let settings: Settings = builder
        .build()
        .context("Failed to build settings")?
        .try_deserialize()
        .context("Failed to deserialize settings")?;

    tracing::debug!(?settings, "Settings loaded");
    Ok(settings)
}

/// Manages the persisted operator config (`config.yaml`).
///
/// The document is a flat key-value YAML file rewritten on every change.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating the directory if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join("config.yaml"),
            config_dir,
        })
    }

    /// Load the persisted config.
    ///
    /// A missing or unparseable file yields defaults; this never fails the
    /// startup. The returned value is what is on disk; the startup rule that
    /// clears `auto_process` is applied by the state manager.
    pub fn load(&self) -> PersistedConfig {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return PersistedConfig::default();
        }

        match self.read_config() {
            Ok(config) => {
                tracing::info!("Loaded config from {}", self.config_path);
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {}: {:#}", self.config_path, e);
                PersistedConfig::default()
            }
        }
    }

    fn read_config(&self) -> Result<PersistedConfig> {
        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        // An empty document is valid and means "all defaults"
        if file_contents.trim().is_empty() {
            return Ok(PersistedConfig::default());
        }

        serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))
    }

    pub fn save(&self, config: &PersistedConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
