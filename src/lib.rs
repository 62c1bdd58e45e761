// Manyfold Intake - watched-folder intake for 3D model drops
//
// This is the library crate: watcher, coordinator, classifier, sibling resolver
// and handler strategies. The binary crate (main.rs) wires them together.

pub mod config;
pub mod handlers;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod watcher;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use handlers::{Collaborators, Dispatcher, HandlerOutcome};
pub use intake::{
    HandlerKind, IntakeCoordinator, IntakeError, IntakeHandle, QueueDirs, SettleOutcome,
};
pub use metrics::Metrics;
pub use models::{ErrorEntry, IntakeState, PersistedConfig, ProcessorState, Settings};
pub use state::{StateChange, StateManager};
pub use watcher::{DebouncedWatcher, WatchError, WatcherConfig, WatcherHandle};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
