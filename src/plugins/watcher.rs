// src/plugins/watcher.rs — Hot reload: watch the plugin directory and rebuild changed plugins
//
// The OS watcher thread turns filesystem notifications into `ReloadEvent`s on
// a bounded channel. A single reloader task consumes them, drops repeats for
// the same path inside the debounce window, and drives the manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::infra::errors::PluginError;
use crate::plugins::manager::PluginManager;

const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Created or modified: rebuild from source.
    Changed,
    /// Deleted: unload.
    Removed,
}

/// A filesystem change that affects one plugin.
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    pub path: PathBuf,
    pub plugin: String,
    pub kind: ReloadKind,
    pub timestamp: Instant,
}

impl ReloadEvent {
    pub fn changed(path: impl Into<PathBuf>, plugin: impl Into<String>, timestamp: Instant) -> Self {
        Self {
            path: path.into(),
            plugin: plugin.into(),
            kind: ReloadKind::Changed,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

/// Per-path debounce keyed on the last handled timestamp.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_handled: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_handled: HashMap::new(),
        }
    }

    /// True if an event for `path` at `at` should be handled. Records it if so.
    pub fn should_handle(&mut self, path: &Path, at: Instant) -> bool {
        if let Some(prev) = self.last_handled.get(path) {
            if at.saturating_duration_since(*prev) < self.window {
                return false;
            }
        }
        self.last_handled.insert(path.to_path_buf(), at);
        true
    }

    pub fn forget(&mut self, path: &Path) {
        self.last_handled.remove(path);
    }
}

// ---------------------------------------------------------------------------
// Reload worker — the consumer side
// ---------------------------------------------------------------------------

/// Consumes reload events and applies them to the manager.
pub struct ReloadWorker {
    manager: Arc<PluginManager>,
    debouncer: Debouncer,
    reloads: u64,
}

impl ReloadWorker {
    pub fn new(manager: Arc<PluginManager>, debounce: Duration) -> Self {
        Self {
            manager,
            debouncer: Debouncer::new(debounce),
            reloads: 0,
        }
    }

    /// Number of events that actually triggered a reload or unload.
    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    /// Apply one event. Returns false if it was debounced away.
    ///
    /// Errors are logged; they never stop the worker.
    pub async fn process(&mut self, event: ReloadEvent) -> bool {
        match event.kind {
            ReloadKind::Removed => self.debouncer.forget(&event.path),
            ReloadKind::Changed => {
                if !self.debouncer.should_handle(&event.path, event.timestamp) {
                    tracing::debug!(plugin = %event.plugin, "Debounced reload event");
                    return false;
                }
            }
        }
        self.reloads += 1;

        let manager = self.manager.clone();
        let path = event.path.clone();
        // Loading reads and compiles the file; keep it off the async workers.
        let outcome = tokio::task::spawn_blocking(move || manager.reload_path(&path)).await;

        match outcome {
            Ok(Ok(Some(descriptor))) => {
                tracing::info!(
                    plugin = %descriptor.name,
                    version = %descriptor.version,
                    "Hot-reloaded plugin"
                );
            }
            Ok(Ok(None)) => {
                tracing::debug!(
                    plugin = %event.plugin,
                    "No plugin installed from {}",
                    event.path.display()
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(plugin = %event.plugin, "Hot reload failed: {}", e);
            }
            Err(e) => {
                tracing::error!(plugin = %event.plugin, "Hot reload task panicked: {}", e);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// HotReloadWatcher — Stopped → Watching → Stopped
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Watching,
}

struct Running {
    // Dropping the OS watcher closes the event channel's sending side.
    os_watcher: notify::RecommendedWatcher,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Watches one plugin directory (non-recursive) and hot-reloads changed plugins.
pub struct HotReloadWatcher {
    manager: Arc<PluginManager>,
    debounce: Duration,
    running: Option<Running>,
}

impl HotReloadWatcher {
    pub fn new(manager: Arc<PluginManager>, debounce: Duration) -> Self {
        Self {
            manager,
            debounce,
            running: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.running.is_some() {
            WatcherState::Watching
        } else {
            WatcherState::Stopped
        }
    }

    pub fn is_watching(&self) -> bool {
        self.state() == WatcherState::Watching
    }

    /// Start watching. A no-op when already watching. Must run inside a Tokio runtime.
    pub fn start(&mut self) -> Result<(), PluginError> {
        if self.running.is_some() {
            return Ok(());
        }

        let dir = self.manager.dir().to_path_buf();
        if !dir.is_dir() {
            return Err(PluginError::Config(format!(
                "plugin directory {} does not exist",
                dir.display()
            )));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let filter = self.manager.clone();
        let mut os_watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for reload in classify_event(&filter, &event) {
                        // Runs on the notify thread, not a runtime worker.
                        if tx.blocking_send(reload).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!("Plugin watcher error: {}", e),
            },
        )
        .map_err(|e| PluginError::Other(anyhow::anyhow!("failed to create file watcher: {e}")))?;

        os_watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                PluginError::Other(anyhow::anyhow!("failed to watch {}: {e}", dir.display()))
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = ReloadWorker::new(self.manager.clone(), self.debounce);
        let task = tokio::spawn(run_reloader(worker, rx, shutdown_rx));

        tracing::info!(
            dir = %dir.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Plugin watcher started"
        );
        self.running = Some(Running {
            os_watcher,
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop watching and wait for the reloader task to exit.
    ///
    /// The join covers the reloader task only. Dropping the notify watcher
    /// signals its OS event thread to finish but does not wait for it; any
    /// event it still delivers fails to send and is discarded.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        drop(running.os_watcher);
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            tracing::warn!("Plugin watcher task ended abnormally: {}", e);
        }
        tracing::info!("Plugin watcher stopped");
    }
}

impl Drop for HotReloadWatcher {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

async fn run_reloader(
    mut worker: ReloadWorker,
    mut rx: mpsc::Receiver<ReloadEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Some(event) => {
                    worker.process(event).await;
                }
                None => break,
            },
        }
    }
    tracing::debug!("Reloader exited after {} reloads", worker.reloads());
}

/// Map a raw notify event to reload events for plugin source files.
fn classify_event(manager: &PluginManager, event: &notify::Event) -> Vec<ReloadEvent> {
    let removed = matches!(event.kind, EventKind::Remove(_));
    if !removed && !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }

    let now = Instant::now();
    event
        .paths
        .iter()
        .filter(|p| !p.is_dir())
        .filter_map(|path| {
            let plugin = manager.candidate_name(path)?;
            // Renames report a Modify on the old name, which no longer exists.
            let kind = if removed || !path.exists() {
                ReloadKind::Removed
            } else {
                ReloadKind::Changed
            };
            Some(ReloadEvent {
                path: path.clone(),
                plugin,
                kind,
                timestamp: now,
            })
        })
        .collect()
}
