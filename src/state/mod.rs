// State management module
//
// Wraps IntakeState with thread-safe access using Arc<RwLock<T>> and emits
// change events for the control surface. Only the coordinator actor mutates.

use crate::models::{ErrorEntry, IntakeState, PersistedConfig, ProcessorState};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when intake state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The coordinator moved between Waiting, Processing and Locked
    ProcessorStateChanged {
        from: ProcessorState,
        to: ProcessorState,
    },

    /// The automatic processing toggle flipped
    AutoProcessChanged { enabled: bool },

    ThemeChanged { theme: String },

    /// A failure was appended to the error log
    ErrorRecorded { filename: String, message: String },

    /// A dispatch finished
    ItemProcessed {
        name: String,
        handler: String,
        success: bool,
    },
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) and [`snapshot()`](Self::snapshot) for observers
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The coordinator actor is the single writer; the control surface only reads.
pub struct StateManager {
    state: Arc<RwLock<IntakeState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event broadcast buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(IntakeState::default())),
            state_tx,
        }
    }

    /// Clone of the entire state, safe to hold without locks.
    pub fn snapshot(&self) -> IntakeState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let auto = state_manager.read(|state| state.config.auto_process);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&IntakeState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut IntakeState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &IntakeState, new: &IntakeState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.processor_state != new.processor_state {
            changes.push(StateChange::ProcessorStateChanged {
                from: old.processor_state,
                to: new.processor_state,
            });
        }

        if old.config.auto_process != new.config.auto_process {
            changes.push(StateChange::AutoProcessChanged {
                enabled: new.config.auto_process,
            });
        }

        if old.config.theme != new.config.theme {
            changes.push(StateChange::ThemeChanged {
                theme: new.config.theme.clone(),
            });
        }

        // Length saturates at capacity, so compare the running total instead
        if new.errors.total_recorded() > old.errors.total_recorded() {
            let appended = (new.errors.total_recorded() - old.errors.total_recorded()) as usize;
            let recent: Vec<&ErrorEntry> = new.errors.iter().rev().take(appended).collect();
            for entry in recent.into_iter().rev() {
                changes.push(StateChange::ErrorRecorded {
                    filename: entry.filename.clone(),
                    message: entry.message.clone(),
                });
            }
        }

        changes
    }

    // Convenience methods used by the coordinator

    pub fn set_processor_state(&self, processor_state: ProcessorState) -> Vec<StateChange> {
        self.update(|state| {
            state.processor_state = processor_state;
            if processor_state == ProcessorState::Waiting {
                state.current_item = None;
            }
        })
    }

    /// Enter `Processing` for the named item
    pub fn begin_processing(&self, item: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.processor_state = ProcessorState::Processing;
            state.current_item = Some(item.to_string());
        })
    }

    pub fn set_auto_process(&self, enabled: bool) -> Vec<StateChange> {
        self.update(|state| state.config.auto_process = enabled)
    }

    pub fn set_theme(&self, theme: impl Into<String>) -> Vec<StateChange> {
        let theme = theme.into();
        self.update(|state| state.config.theme = theme)
    }

    pub fn record_error(
        &self,
        filename: impl Into<String>,
        message: impl Into<String>,
    ) -> Vec<StateChange> {
        let filename = filename.into();
        let message = message.into();
        self.update(|state| state.errors.record(filename, message))
    }

    /// Record the result of one dispatch
    pub fn record_item(&self, name: String, handler: &str, success: bool) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            if success {
                state.items_processed += 1;
            } else {
                state.items_failed += 1;
            }
        });

        let processed_event = StateChange::ItemProcessed {
            name,
            handler: handler.to_string(),
            success,
        };

        let _ = self.state_tx.send(processed_event.clone());
        changes.push(processed_event);

        changes
    }

    /// Load persisted preferences at startup
    ///
    /// `auto_process` is always cleared here; a restart never resumes
    /// unattended conversion on its own.
    pub fn load_from_config(&self, config: &PersistedConfig) -> Vec<StateChange> {
        self.update(|state| {
            state.config = config.clone().for_startup();

            tracing::info!(
                "Loaded persisted config: theme={}, auto_process={} (persisted {})",
                state.config.theme,
                state.config.auto_process,
                config.auto_process
            );
        })
    }

    pub fn config(&self) -> PersistedConfig {
        self.read(|state| state.config.clone())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
