//! Intake coordination: classification, sibling resolution and the coordinator actor.
//!
//! - [`classify`] picks a [`HandlerKind`] for a settled path without mutating anything.
//! - [`resolve_siblings`] associates preview images with a model group.
//! - [`IntakeCoordinator`] is the single writer of processor state, config and error log;
//!   everything else talks to it through an [`IntakeHandle`].
//! - [`queue`] holds the directory helpers shared with the watcher and handlers.

pub mod classifier;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod siblings;

pub use classifier::{HandlerKind, classify};
pub use coordinator::{IntakeCoordinator, IntakeHandle, QueueDirs, SettleOutcome};
pub use error::IntakeError;
pub use siblings::{SiblingGroup, names_match, resolve_siblings, tokenize};
