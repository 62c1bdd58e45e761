use super::debouncer::PendingRegistry;
use super::error::WatchError;
use crate::intake::{IntakeHandle, queue};
use crate::models::Settings;
use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Watcher timing and backend selection
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub input_dir: Utf8PathBuf,
    /// Quiescence window before a path settles
    pub settle_window: Duration,
    /// How often the registry is scanned (and the polling backend rescans)
    pub poll_interval: Duration,
    /// Use `PollWatcher` instead of the platform backend, for bind mounts
    pub use_polling: bool,
}

impl WatcherConfig {
    pub fn from_settings(settings: &Settings, input_dir: &Utf8Path) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            settle_window: settings.settle_window(),
            poll_interval: settings.poll_interval(),
            use_polling: settings.use_polling_watcher,
        }
    }
}

/// Running watcher; dropping it leaves the task running until the coordinator closes.
pub struct WatcherHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop the loop and wait for it. Paths still settling are discarded.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Watcher task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Debounced watcher over the top level of the input directory.
///
/// Events below a top-level folder refresh that folder, so a project settles
/// only once all of its content has been quiet for the window.
pub struct DebouncedWatcher {
    input_dir: Utf8PathBuf,
    registry: PendingRegistry,
    poll_interval: Duration,
    intake: IntakeHandle,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    /// Kept alive for the lifetime of the loop
    _watcher: Box<dyn Watcher + Send>,
}

impl DebouncedWatcher {
    /// Scan existing entries, subscribe to events, and start the settle loop.
    pub async fn spawn(
        config: WatcherConfig,
        intake: IntakeHandle,
    ) -> Result<WatcherHandle, WatchError> {
        let input_dir = prepare_dir(&config.input_dir)?;

        // Items dropped while the process was stopped
        startup_scan(&input_dir, &intake).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        };

        let mut watcher: Box<dyn Watcher + Send> = if config.use_polling {
            let notify_config = notify::Config::default().with_poll_interval(config.poll_interval);
            Box::new(PollWatcher::new(handler, notify_config)?)
        } else {
            Box::new(notify::recommended_watcher(handler)?)
        };

        watcher
            .watch(input_dir.as_std_path(), RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: input_dir.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Watching {} ({} backend, settle window {:.1}s)",
            input_dir,
            if config.use_polling { "polling" } else { "native" },
            config.settle_window.as_secs_f64()
        );

        let service = Self {
            input_dir,
            registry: PendingRegistry::new(config.settle_window),
            poll_interval: config.poll_interval,
            intake,
            event_rx,
            _watcher: watcher,
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(service.run(stop_rx));

        Ok(WatcherHandle {
            stop_tx: Some(stop_tx),
            task,
        })
    }

    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(res) = self.event_rx.recv() => match res {
                    Ok(event) => self.handle_event(event),
                    Err(e) => tracing::error!("File watch error: {}", e),
                },

                _ = ticker.tick() => {
                    if let Err(e) = self.flush_settled().await {
                        tracing::error!("Stopping watcher: {}", e);
                        break;
                    }
                }

                _ = &mut stop_rx => {
                    tracing::info!(
                        "Watcher stopping ({} path(s) still settling)",
                        self.registry.len()
                    );
                    break;
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        for path in registrable_paths(&event) {
            let Ok(path) = Utf8PathBuf::from_path_buf(path.clone()) else {
                tracing::debug!("Ignoring non-UTF-8 path {:?}", path);
                continue;
            };
            if queue::is_hidden(&path) {
                continue;
            }
            let Some(entry) = top_level_entry(&self.input_dir, &path) else {
                continue;
            };
            if self.registry.record(entry.clone()) {
                tracing::debug!("{:?} {} -> pending {}", event.kind, path, entry);
            }
        }
    }

    /// Hand settled paths to the coordinator, directories and models first.
    async fn flush_settled(&mut self) -> Result<(), WatchError> {
        let mut settled: Vec<Utf8PathBuf> = self
            .registry
            .take_settled()
            .into_iter()
            .filter(|p| {
                let present = queue::exists(p);
                if !present {
                    tracing::debug!("{} vanished before settling", p);
                }
                present
            })
            .collect();
        if settled.is_empty() {
            return Ok(());
        }

        queue::sort_by_priority(&mut settled);
        for path in settled {
            tracing::info!("Settled: {}", path);
            self.intake
                .submit_settled(path)
                .await
                .map_err(|_| WatchError::CoordinatorUnavailable)?;
        }
        Ok(())
    }
}

fn prepare_dir(dir: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    let io_err = |source| WatchError::Io {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    dir.canonicalize_utf8().map_err(io_err)
}

async fn startup_scan(input_dir: &Utf8Path, intake: &IntakeHandle) -> Result<(), WatchError> {
    let mut existing = queue::list_visible(input_dir).map_err(|source| WatchError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    queue::sort_by_priority(&mut existing);

    if !existing.is_empty() {
        tracing::info!("Startup scan: {} existing item(s) in {}", existing.len(), input_dir);
    }
    for path in existing {
        intake
            .submit_settled(path)
            .await
            .map_err(|_| WatchError::CoordinatorUnavailable)?;
    }
    Ok(())
}

/// Paths from `event` that should refresh the registry.
///
/// Removals and rename sources are skipped; a path that vanished is dropped at settle time.
fn registrable_paths(event: &Event) -> &[std::path::PathBuf] {
    match event.kind {
        EventKind::Create(_) => event.paths.as_slice(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or(&[])
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => event.paths.as_slice(),
        EventKind::Access(_) | EventKind::Remove(_) => &[],
    }
}

/// The top-level entry of `input_dir` that contains `path`.
pub fn top_level_entry(input_dir: &Utf8Path, path: &Utf8Path) -> Option<Utf8PathBuf> {
    let relative = path.strip_prefix(input_dir).ok()?;
    let first = relative.components().next()?;
    Some(input_dir.join(first.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_top_level_entry() {
        let input = Utf8Path::new("/input");
        assert_eq!(
            top_level_entry(input, Utf8Path::new("/input/project/parts/a.stl")),
            Some(Utf8PathBuf::from("/input/project"))
        );
        assert_eq!(
            top_level_entry(input, Utf8Path::new("/input/cube.stl")),
            Some(Utf8PathBuf::from("/input/cube.stl"))
        );
        assert_eq!(top_level_entry(input, input), None);
        assert_eq!(top_level_entry(input, Utf8Path::new("/staging/cube.stl")), None);
    }

    #[test]
    fn test_registrable_paths_by_kind() {
        let create = event(EventKind::Create(CreateKind::File), &["/input/a.stl"]);
        assert_eq!(registrable_paths(&create).len(), 1);

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/input/a.stl"],
        );
        assert_eq!(registrable_paths(&write).len(), 1);

        let rename = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/input/a.part", "/input/a.stl"],
        );
        assert_eq!(registrable_paths(&rename), &[PathBuf::from("/input/a.stl")]);

        let rename_from =
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/input/a"]);
        assert!(registrable_paths(&rename_from).is_empty());

        let remove = event(EventKind::Remove(RemoveKind::File), &["/input/a.stl"]);
        assert!(registrable_paths(&remove).is_empty());
    }
}
