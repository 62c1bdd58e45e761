//! Debounced filesystem watcher for the input directory.
//!
//! [`PendingRegistry`] coalesces bursts of events per top-level entry;
//! [`DebouncedWatcher`] feeds `notify` events into it and hands each settled
//! path to the intake coordinator exactly once.

pub mod debouncer;
pub mod error;
pub mod service;

pub use debouncer::PendingRegistry;
pub use error::WatchError;
pub use service::{DebouncedWatcher, WatcherConfig, WatcherHandle, top_level_entry};
