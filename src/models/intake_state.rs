use crate::models::PersistedConfig;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Number of entries the error log retains before evicting the oldest.
pub const ERROR_LOG_CAPACITY: usize = 50;

/// Coordinator state as seen by the control surface.
///
/// `Processing` is held only while one item is being handled and `Locked`
/// only while a blocked admission is being reported; both return to `Waiting`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    #[default]
    Waiting,
    Processing,
    Locked,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessorState::Waiting => "waiting",
            ProcessorState::Processing => "processing",
            ProcessorState::Locked => "locked",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub filename: String,
}

fn serialize_timestamp<S>(timestamp: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&timestamp.format("%Y-%m-%d %H:%M:%S"))
}

/// Bounded, ordered record of non-fatal failures.
///
/// Oldest entries are evicted first once [`ERROR_LOG_CAPACITY`] is reached.
/// `total_recorded` keeps counting past the cap so observers can tell that
/// something new arrived even when the length stays at the limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
    total_recorded: u64,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ErrorEntry) {
        if self.entries.len() == ERROR_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_recorded += 1;
    }

    /// Record a failure stamped with the current local time.
    pub fn record(&mut self, filename: impl Into<String>, message: impl Into<String>) {
        self.push(ErrorEntry {
            timestamp: Local::now(),
            message: message.into(),
            filename: filename.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn latest(&self) -> Option<&ErrorEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<ErrorEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Everything the coordinator owns that the control surface may observe.
///
/// Wrapped by [`crate::state::StateManager`]; only the coordinator actor mutates it.
#[derive(Clone, Debug, Default)]
pub struct IntakeState {
    pub processor_state: ProcessorState,
    pub config: PersistedConfig,
    pub errors: ErrorLog,

    // Lifetime counters
    pub items_processed: usize,
    pub items_failed: usize,
    pub current_item: Option<String>,
}

impl IntakeState {
    pub fn is_idle(&self) -> bool {
        self.processor_state == ProcessorState::Waiting
    }
}
