//! Data models for the intake service.
//!
//! - [`Settings`]: runtime settings (queue directories, debounce timing, converter commands)
//! - [`PersistedConfig`]: the operator toggle and theme saved to `config.yaml`
//! - [`IntakeState`]: processor state, config and error log observed by the control surface
//!
//! # Architecture Note
//!
//! `IntakeState` is wrapped by [`StateManager`](crate::state::StateManager) and is only
//! mutated from the coordinator actor. Everything else reads snapshots.

pub mod config;
pub mod intake_state;
pub mod settings;

pub use config::PersistedConfig;
pub use intake_state::{ERROR_LOG_CAPACITY, ErrorEntry, ErrorLog, IntakeState, ProcessorState};
pub use settings::Settings;
