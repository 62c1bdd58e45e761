//! Intake coordinator actor.
//!
//! A single tokio task owns the processing toggle, the staging lock, dispatch and
//! the error log. The watcher, the startup scan and the control surface reach it
//! only through an [`IntakeHandle`], so every state transition has one writer.
//!
//! # Admission of a settled path
//!
//! 1. Roots, nested paths and hidden names are ignored.
//! 2. Processing disabled: the item moves to Staging unchanged.
//! 3. Staging non-empty and the item is not a model: `Locked`, item stays in Input.
//! 4. Otherwise `Processing`: classify, dispatch, quarantine on failure.
//! 5. Back to `Waiting`; drain Input if Staging emptied; auto-reset when both queues are empty.

use crate::config::ConfigManager;
use crate::handlers::output::item_name;
use crate::handlers::{Dispatcher, HandlerOutcome};
use crate::intake::classifier::{HandlerKind, classify};
use crate::intake::{IntakeError, queue};
use crate::metrics::Metrics;
use crate::models::{ErrorEntry, IntakeState, PersistedConfig, ProcessorState};
use crate::state::{StateChange, StateManager};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Pending commands before senders wait
const COMMAND_BUFFER: usize = 256;

/// The two queue locations, canonicalised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDirs {
    pub input: Utf8PathBuf,
    pub staging: Utf8PathBuf,
}

impl QueueDirs {
    /// Create both directories if needed and resolve them to canonical paths.
    pub fn prepare(input: &Utf8Path, staging: &Utf8Path) -> Result<Self, IntakeError> {
        let resolve = |dir: &Utf8Path| -> Result<Utf8PathBuf, IntakeError> {
            std::fs::create_dir_all(dir).map_err(|e| IntakeError::io(dir, e))?;
            dir.canonicalize_utf8().map_err(|e| IntakeError::io(dir, e))
        };
        Ok(Self {
            input: resolve(input)?,
            staging: resolve(staging)?,
        })
    }

    pub fn is_root(&self, path: &Utf8Path) -> bool {
        path == self.input || path == self.staging
    }

    pub fn in_input(&self, path: &Utf8Path) -> bool {
        path.parent() == Some(self.input.as_path())
    }

    pub fn in_staging(&self, path: &Utf8Path) -> bool {
        path.parent() == Some(self.staging.as_path())
    }

    fn roots(&self) -> [&Utf8Path; 2] {
        [&self.input, &self.staging]
    }

    /// Resolve the parent directory so paths reported through symlinks or
    /// relative roots compare equal to the queue directories.
    fn normalize(&self, path: &Utf8Path) -> Utf8PathBuf {
        if let Ok(resolved) = path.canonicalize_utf8() {
            if self.is_root(&resolved) {
                return resolved;
            }
        }
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize_utf8()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf()),
            _ => path.to_path_buf(),
        }
    }
}

/// What happened to one settled path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Root, nested or hidden path, or a staged item while processing is off
    Ignored,
    /// Gone before it could be handled
    Vanished,
    /// Moved into Staging unchanged
    Quarantined(Utf8PathBuf),
    /// Refused by the staging lock, left in Input
    Deferred,
    /// Packaged into `output/<slug>`
    Processed { slug: String },
    /// Handler failed or nothing applied; the item was quarantined
    Failed,
}

impl SettleOutcome {
    /// Whether the item left its queue
    fn made_progress(&self) -> bool {
        matches!(
            self,
            SettleOutcome::Quarantined(_) | SettleOutcome::Processed { .. } | SettleOutcome::Failed
        )
    }
}

#[derive(Debug)]
enum IntakeCommand {
    Settled {
        path: Utf8PathBuf,
        reply: Option<oneshot::Sender<SettleOutcome>>,
    },
    SetAutoProcess {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SetTheme {
        theme: String,
        reply: oneshot::Sender<()>,
    },
    ProcessNamed {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    ProcessAllStaged {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Cloneable entry point into the coordinator.
///
/// Mutations travel over the command channel; reads go straight to the shared
/// [`StateManager`] snapshot.
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<IntakeCommand>,
    state: Arc<StateManager>,
}

impl IntakeHandle {
    async fn send(&self, command: IntakeCommand) -> Result<(), IntakeError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| IntakeError::CoordinatorUnavailable)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> IntakeCommand,
    ) -> Result<T, IntakeError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| IntakeError::CoordinatorUnavailable)
    }

    /// Queue a settled path without waiting for it to be handled.
    pub async fn submit_settled(&self, path: Utf8PathBuf) -> Result<(), IntakeError> {
        self.send(IntakeCommand::Settled { path, reply: None }).await
    }

    /// Handle a settled path and wait for the outcome.
    pub async fn handle_settled(&self, path: Utf8PathBuf) -> Result<SettleOutcome, IntakeError> {
        self.request(|reply| IntakeCommand::Settled {
            path,
            reply: Some(reply),
        })
        .await
    }

    /// Flip the toggle. Enabling drains Staging and Input before returning.
    pub async fn set_auto_process(&self, enabled: bool) -> Result<(), IntakeError> {
        self.request(|reply| IntakeCommand::SetAutoProcess { enabled, reply })
            .await
    }

    pub async fn set_theme(&self, theme: impl Into<String>) -> Result<(), IntakeError> {
        let theme = theme.into();
        self.request(|reply| IntakeCommand::SetTheme { theme, reply }).await
    }

    /// Dispatch one Staging item by file name, ignoring the toggle and the lock.
    pub async fn process_named(&self, name: impl Into<String>) -> Result<bool, IntakeError> {
        let name = name.into();
        self.request(|reply| IntakeCommand::ProcessNamed { name, reply })
            .await
    }

    /// Dispatch everything in Staging; returns the number of successes.
    pub async fn process_all_staged(&self) -> Result<usize, IntakeError> {
        self.request(|reply| IntakeCommand::ProcessAllStaged { reply })
            .await
    }

    pub fn get_state(&self) -> ProcessorState {
        self.state.read(|s| s.processor_state)
    }

    pub fn get_config(&self) -> PersistedConfig {
        self.state.config()
    }

    pub fn list_errors(&self) -> Vec<ErrorEntry> {
        self.state.read(|s| s.errors.to_vec())
    }

    pub fn snapshot(&self) -> IntakeState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    /// Stop the actor after the command in flight.
    pub async fn shutdown(&self) -> Result<(), IntakeError> {
        self.send(IntakeCommand::Shutdown).await
    }
}

/// The actor. Build with [`IntakeCoordinator::new`], then [`spawn`](Self::spawn).
pub struct IntakeCoordinator {
    dirs: QueueDirs,
    dispatcher: Dispatcher,
    state: Arc<StateManager>,
    config: ConfigManager,
    metrics: Arc<Metrics>,
    rx: mpsc::Receiver<IntakeCommand>,
}

impl IntakeCoordinator {
    /// Loads the persisted config (with processing forced off) into a fresh state.
    pub fn new(
        dirs: QueueDirs,
        dispatcher: Dispatcher,
        config: ConfigManager,
        metrics: Arc<Metrics>,
    ) -> (Self, IntakeHandle) {
        let state = Arc::new(StateManager::new());
        state.load_from_config(&config.load());

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = IntakeHandle {
            tx,
            state: state.clone(),
        };

        let coordinator = Self {
            dirs,
            dispatcher,
            state,
            config,
            metrics,
            rx,
        };
        (coordinator, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Intake coordinator started (input: {}, staging: {})",
            self.dirs.input,
            self.dirs.staging
        );

        while let Some(command) = self.rx.recv().await {
            match command {
                IntakeCommand::Settled { path, reply } => {
                    let outcome = self.on_settled(&path).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                IntakeCommand::SetAutoProcess { enabled, reply } => {
                    self.set_auto_process(enabled).await;
                    let _ = reply.send(());
                }
                IntakeCommand::SetTheme { theme, reply } => {
                    self.state.set_theme(theme);
                    self.persist();
                    let _ = reply.send(());
                }
                IntakeCommand::ProcessNamed { name, reply } => {
                    let _ = reply.send(self.process_named(&name).await);
                }
                IntakeCommand::ProcessAllStaged { reply } => {
                    let _ = reply.send(self.process_all_staged().await);
                }
                IntakeCommand::Shutdown => break,
            }
        }

        tracing::info!("Intake coordinator stopped");
    }

    async fn on_settled(&mut self, path: &Utf8Path) -> SettleOutcome {
        let path = self.dirs.normalize(path);
        let outcome = self.admit(&path).await;

        if matches!(outcome, SettleOutcome::Processed { .. })
            && queue::is_empty_visible(&self.dirs.staging)
        {
            self.drain_input().await;
        }
        self.auto_reset();
        outcome
    }

    /// Admission for one top-level path, without the follow-up drain.
    async fn admit(&mut self, path: &Utf8Path) -> SettleOutcome {
        if self.dirs.is_root(path) || queue::is_hidden(path) {
            return SettleOutcome::Ignored;
        }
        let in_staging = self.dirs.in_staging(path);
        if !in_staging && !self.dirs.in_input(path) {
            tracing::debug!("Ignoring nested path {}", path);
            return SettleOutcome::Ignored;
        }
        if !queue::exists(path) {
            tracing::debug!("{} vanished before admission", path);
            self.metrics.record_vanished();
            return SettleOutcome::Vanished;
        }

        let auto_process = self.state.read(|s| s.config.auto_process);
        if !auto_process {
            if in_staging {
                return SettleOutcome::Ignored;
            }
            return match self.quarantine(path) {
                Some(destination) => SettleOutcome::Quarantined(destination),
                None => SettleOutcome::Failed,
            };
        }

        if !in_staging && !queue::is_model(path) && !queue::is_empty_visible(&self.dirs.staging) {
            self.state.set_processor_state(ProcessorState::Locked);
            tracing::warn!(
                "Staging lock: Staging is not empty, leaving {} in Input until it drains",
                path
            );
            self.metrics.record_deferred();
            self.state.set_processor_state(ProcessorState::Waiting);
            return SettleOutcome::Deferred;
        }

        let (kind, result) = self.dispatch(path).await;
        match result {
            Ok(outcome) => SettleOutcome::Processed { slug: outcome.slug },
            Err(IntakeError::VanishedInput(_)) => SettleOutcome::Vanished,
            Err(_) => {
                if !in_staging {
                    let members = match kind {
                        Some(HandlerKind::ModelAggregate(models)) => models,
                        _ => vec![path.to_path_buf()],
                    };
                    for member in members.iter().filter(|m| queue::exists(m)) {
                        self.quarantine(member);
                    }
                }
                SettleOutcome::Failed
            }
        }
    }

    /// Classify and run the handler; records the result and returns to `Waiting`.
    async fn dispatch(
        &mut self,
        path: &Utf8Path,
    ) -> (Option<HandlerKind>, Result<HandlerOutcome, IntakeError>) {
        let name = item_name(path);
        self.state.begin_processing(&name);

        let kind = classify(path, &self.dirs.roots());
        let label = kind.as_ref().map_or("none", HandlerKind::label);
        let started = Instant::now();

        let result = match &kind {
            Some(kind) => self.dispatcher.dispatch(kind, path).await,
            None => Err(IntakeError::ClassificationMiss(name.clone())),
        };

        match &result {
            Ok(outcome) => {
                tracing::info!("Processed {} as {} into {}", name, label, outcome.output_dir);
                for fallback in &outcome.fallbacks {
                    let file = match fallback {
                        IntakeError::ConversionFailure { file, .. } => file.clone(),
                        _ => name.clone(),
                    };
                    self.state.record_error(file, fallback.to_string());
                }
                self.metrics.record_processed(started.elapsed(), outcome.fallbacks.len());
                self.state.record_item(name, label, true);
            }
            Err(IntakeError::VanishedInput(gone)) => {
                tracing::debug!("{} vanished before dispatch", gone);
                self.metrics.record_vanished();
            }
            Err(e) => {
                tracing::error!("Processing failed for {}: {}", name, e);
                self.metrics.record_failed(started.elapsed());
                self.state.record_error(name.clone(), e.to_string());
                self.state.record_item(name, label, false);
            }
        }

        self.state.set_processor_state(ProcessorState::Waiting);
        (kind, result)
    }

    /// Move an Input item into Staging unchanged. `None` when the move failed.
    fn quarantine(&mut self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        let name = item_name(path);
        let destination = queue::unique_destination(&self.dirs.staging, &name);
        match queue::move_path(path, &destination) {
            Ok(()) => {
                tracing::info!("Moved {} to {}", path, destination);
                self.metrics.record_quarantined();
                Some(destination)
            }
            Err(e) => {
                tracing::error!("Could not move {} to Staging: {}", path, e);
                self.state.record_error(name, format!("Could not move to Staging: {e}"));
                None
            }
        }
    }

    /// Re-evaluate Input until a pass makes no progress.
    ///
    /// Every path leaves the work list once it has been dispatched or moved;
    /// deferred paths are retried only after some other item made progress.
    async fn drain_input(&mut self) {
        self.metrics.record_rescan();
        let mut settled: HashSet<Utf8PathBuf> = HashSet::new();

        loop {
            let mut pending = match queue::list_visible(&self.dirs.input) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!("Could not scan {}: {}", self.dirs.input, e);
                    return;
                }
            };
            pending.retain(|p| !settled.contains(p));
            if pending.is_empty() {
                break;
            }
            queue::sort_by_priority(&mut pending);
            tracing::info!("Rescanning Input: {} stranded item(s)", pending.len());

            let mut progressed = false;
            for path in pending {
                let outcome = self.admit(&path).await;
                if outcome != SettleOutcome::Deferred {
                    settled.insert(path);
                }
                progressed |= outcome.made_progress();
            }

            if !progressed {
                break;
            }
        }
    }

    async fn set_auto_process(&mut self, enabled: bool) {
        tracing::info!("Automatic processing {}", if enabled { "enabled" } else { "disabled" });
        self.state.set_auto_process(enabled);
        self.persist();

        if enabled {
            self.scan_staging().await;
            self.drain_input().await;
            self.auto_reset();
        }
    }

    async fn process_named(&mut self, name: &str) -> bool {
        let path = self.dirs.staging.join(name);
        if !self.dirs.in_staging(&path) || !queue::exists(&path) {
            tracing::error!("File not found in Staging: {}", name);
            self.state
                .record_error(name, format!("File not found in Staging: {name}"));
            return false;
        }
        self.dispatch(&path).await.1.is_ok()
    }

    async fn process_all_staged(&mut self) -> usize {
        let processed = self.scan_staging().await;
        if processed > 0 {
            self.auto_reset();
        }
        processed
    }

    /// Dispatch every Staging item, models first. Failures stay in Staging.
    async fn scan_staging(&mut self) -> usize {
        let mut staged = match queue::list_visible(&self.dirs.staging) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Could not scan {}: {}", self.dirs.staging, e);
                return 0;
            }
        };
        queue::sort_by_priority(&mut staged);
        tracing::info!("Scanning Staging: {} item(s)", staged.len());

        let mut processed = 0;
        for path in staged {
            // Aggregates consume several entries at once
            if !queue::exists(&path) {
                continue;
            }
            if self.dispatch(&path).await.1.is_ok() {
                processed += 1;
            }
        }
        processed
    }

    /// One-shot batch mode: turn processing off once both queues are empty.
    fn auto_reset(&mut self) {
        let enabled = self.state.read(|s| s.config.auto_process);
        if enabled
            && queue::is_empty_visible(&self.dirs.input)
            && queue::is_empty_visible(&self.dirs.staging)
        {
            tracing::info!("Input and Staging are empty, disabling automatic processing");
            self.state.set_auto_process(false);
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.config.save(&self.state.config()) {
            tracing::error!("Failed to save config: {:#}", e);
        }
    }
}
