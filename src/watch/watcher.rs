//! File watching with per-path debouncing.

use crate::error::{ConfigError, Result};
use crate::tracking::{ReloadExecutor, ReloadOutcome};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Debounce state of one watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No change pending.
    Idle,
    /// A change was seen and the debounce timer is running.
    PendingDebounce,
    /// The executor is reloading the file.
    Reloading,
}

/// Internal outcome channel produced by a [`FileWatcher`].
///
/// Successes and failures share one channel so outcomes for a path arrive in
/// the order their reloads ran.
pub type WatchEvents = mpsc::Receiver<ReloadOutcome>;

/// Subscription for one tracked path.
struct WatchSubscription {
    id: u64,
    directory: PathBuf,
    /// Set while a debounce timer is pending; refreshed by every new event.
    deadline: Option<Instant>,
    /// Settles that have fired and not yet finished.
    settling: usize,
    /// Serializes reloads of this path.
    gate: Arc<tokio::sync::Mutex<()>>,
}

enum Settle {
    Gone,
    Wait(Instant),
    Ready,
}

struct Shared {
    backend: Mutex<Option<RecommendedWatcher>>,
    directories: Mutex<HashMap<PathBuf, usize>>,
    subscriptions: Mutex<HashMap<PathBuf, WatchSubscription>>,
    executor: ReloadExecutor,
    debounce: Duration,
    outcomes_tx: mpsc::Sender<ReloadOutcome>,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

/// Watches tracked files and reloads them once their changes settle.
///
/// Subscriptions are placed on each file's parent directory, so editors that
/// save by writing a new file and renaming it over the old one keep being
/// observed. Bursts of events for one path are coalesced: the first event
/// arms a debounce timer, later ones push its deadline back, and the reload
/// runs once the path has been quiet for the debounce window. At most one
/// reload per path is in flight at any time.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reload::tracking::{Registry, ReloadExecutor, ReloadOutcome};
/// use config_reload::watch::FileWatcher;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> config_reload::error::Result<()> {
/// let executor = ReloadExecutor::new(Arc::new(Registry::new()), false);
/// let (watcher, mut events) =
///     FileWatcher::new(executor, Duration::from_millis(500), CancellationToken::new())?;
///
/// // Register files with the registry, then:
/// // watcher.watch(canonical_path)?;
///
/// while let Some(outcome) = events.recv().await {
///     if let ReloadOutcome::Reloaded(file) = outcome {
///         println!("{} reloaded", file.path().display());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    shared: Arc<Shared>,
}

impl FileWatcher {
    /// Create a watcher that reloads through `executor`.
    ///
    /// Must be called from within a Tokio runtime. The watcher stops when
    /// `cancel` is cancelled or [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform file watcher cannot be created.
    pub fn new(
        executor: ReloadExecutor,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, WatchEvents)> {
        // Raw events from notify's thread into the async world
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

        let backend = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = event_tx.send(event);
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        })?;

        let (outcomes_tx, outcomes) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            backend: Mutex::new(Some(backend)),
            directories: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            executor,
            debounce,
            outcomes_tx,
            cancel,
            next_id: AtomicU64::new(0),
        });

        tokio::spawn(dispatch(Arc::clone(&shared), event_rx));

        Ok((Self { shared }, outcomes))
    }

    /// Start watching `path`.
    ///
    /// `path` must be canonical and already tracked by the executor's
    /// registry. Returns `false` if the path was already watched.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher has been stopped or the parent
    /// directory cannot be subscribed to.
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let mut subscriptions = self.shared.subscriptions.lock();
        if self.shared.cancel.is_cancelled() {
            return Err(ConfigError::Stopped);
        }
        if subscriptions.contains_key(path) {
            return Ok(false);
        }

        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::Inaccessible {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no parent directory",
                ),
            })?;
        self.shared.subscribe_directory(&directory)?;

        subscriptions.insert(
            path.to_path_buf(),
            WatchSubscription {
                id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
                directory,
                deadline: None,
                settling: 0,
                gate: Arc::new(tokio::sync::Mutex::new(())),
            },
        );

        debug!(path = %path.display(), "watching configuration file");
        Ok(true)
    }

    /// Stop watching `path`.
    ///
    /// A pending debounce is cancelled and the outcome of a reload already in
    /// flight is discarded. Returns `false` if the path was not watched.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(subscription) = self.shared.subscriptions.lock().remove(path) else {
            return false;
        };

        self.shared.unsubscribe_directory(&subscription.directory);
        debug!(path = %path.display(), "stopped watching configuration file");
        true
    }

    /// Stop all watching.
    ///
    /// Platform events stop first, then pending timers are cancelled and all
    /// subscriptions are released. Calling this more than once is harmless.
    pub fn stop(&self) {
        let backend = self.shared.backend.lock().take();
        let was_running = backend.is_some();
        drop(backend);

        self.shared.cancel.cancel();

        let released = {
            let mut subscriptions = self.shared.subscriptions.lock();
            let count = subscriptions.len();
            subscriptions.clear();
            count
        };
        self.shared.directories.lock().clear();

        if was_running {
            info!(released, "file watcher stopped");
        }
    }

    /// Whether [`stop`](Self::stop) has run or the cancellation token fired.
    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Whether `path` is watched.
    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.shared.subscriptions.lock().contains_key(path.as_ref())
    }

    /// Current debounce state of `path`, or `None` if it is not watched.
    pub fn state(&self, path: impl AsRef<Path>) -> Option<WatchState> {
        let subscriptions = self.shared.subscriptions.lock();
        let subscription = subscriptions.get(path.as_ref())?;

        Some(if subscription.deadline.is_some() {
            WatchState::PendingDebounce
        } else if subscription.settling > 0 {
            WatchState::Reloading
        } else {
            WatchState::Idle
        })
    }

    /// Get the debounce duration for this watcher.
    pub fn debounce_duration(&self) -> Duration {
        self.shared.debounce
    }

    /// Get a list of currently watched paths.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.subscriptions.lock().keys().cloned().collect()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn subscribe_directory(&self, directory: &Path) -> Result<()> {
        let mut directories = self.directories.lock();
        if let Some(count) = directories.get_mut(directory) {
            *count += 1;
            return Ok(());
        }

        let mut backend = self.backend.lock();
        let watcher = backend.as_mut().ok_or(ConfigError::Stopped)?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        directories.insert(directory.to_path_buf(), 1);
        Ok(())
    }

    fn unsubscribe_directory(&self, directory: &Path) {
        let mut directories = self.directories.lock();
        let Some(count) = directories.get_mut(directory) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        directories.remove(directory);

        if let Some(watcher) = self.backend.lock().as_mut() {
            if let Err(err) = watcher.unwatch(directory) {
                warn!(directory = %directory.display(), error = %err, "failed to unwatch directory");
            }
        }
    }

    /// Record a raw change for `path`, arming or refreshing its timer.
    fn touch(shared: &Arc<Self>, path: &Path) {
        let mut subscriptions = shared.subscriptions.lock();
        let Some(subscription) = subscriptions.get_mut(path) else {
            return;
        };

        let deadline = Instant::now() + shared.debounce;
        if subscription.deadline.replace(deadline).is_some() {
            trace!(path = %path.display(), "debounce refreshed");
            return;
        }

        debug!(path = %path.display(), "change detected, debouncing");
        tokio::spawn(settle(
            Arc::clone(shared),
            path.to_path_buf(),
            subscription.id,
            deadline,
            Arc::clone(&subscription.gate),
        ));
    }

    fn poll_settle(&self, path: &Path, id: u64) -> Settle {
        let mut subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.get_mut(path).filter(|s| s.id == id) else {
            return Settle::Gone;
        };

        match subscription.deadline {
            Some(deadline) if deadline > Instant::now() => Settle::Wait(deadline),
            _ => {
                subscription.deadline = None;
                subscription.settling += 1;
                Settle::Ready
            }
        }
    }

    fn is_current(&self, path: &Path, id: u64) -> bool {
        self.subscriptions
            .lock()
            .get(path)
            .is_some_and(|s| s.id == id)
    }

    fn finish(&self, path: &Path, id: u64) {
        if let Some(subscription) = self.subscriptions.lock().get_mut(path) {
            if subscription.id == id {
                subscription.settling = subscription.settling.saturating_sub(1);
            }
        }
    }

    async fn emit(&self, outcome: ReloadOutcome) {
        let delivered = tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.outcomes_tx.send(outcome) => sent.is_ok(),
        };

        if !delivered {
            debug!("outcome dropped, watcher is shutting down");
        }
    }
}

/// Forward raw notify events to the per-path debouncers.
async fn dispatch(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<Event>) {
    loop {
        let event = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        trace!(kind = ?event.kind, paths = ?event.paths, "received notify event");
        for path in &event.paths {
            Shared::touch(&shared, path);
        }
    }

    debug!("file watcher loop ended");
}

/// Wait for `path` to go quiet, then reload it and emit the outcome.
async fn settle(
    shared: Arc<Shared>,
    path: PathBuf,
    id: u64,
    mut deadline: Instant,
    gate: Arc<tokio::sync::Mutex<()>>,
) {
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        match shared.poll_settle(&path, id) {
            Settle::Gone => {
                debug!(path = %path.display(), "unwatched before settling, change discarded");
                return;
            }
            Settle::Wait(next) => deadline = next,
            Settle::Ready => break,
        }
    }

    // Reloads of the same path run one at a time, in settle order
    let _turn = tokio::select! {
        _ = shared.cancel.cancelled() => return,
        turn = gate.lock() => turn,
    };
    if !shared.is_current(&path, id) {
        return;
    }

    let executor = shared.executor.clone();
    let target = path.clone();
    let outcome = match tokio::task::spawn_blocking(move || executor.reload(&target)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "reload task failed");
            shared.finish(&path, id);
            return;
        }
    };

    if !shared.is_current(&path, id) {
        debug!(path = %path.display(), "unwatched during reload, outcome discarded");
        return;
    }
    if let Some(outcome) = outcome {
        shared.emit(outcome).await;
    }
    shared.finish(&path, id);
}
