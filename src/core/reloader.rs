//! The reloader: public entry point tying registry, watcher and streams together.

use crate::core::{ConfigReloaderBuilder, Destination, ReloadOptions};
use crate::error::{ConfigError, Result};
use crate::tracking::{Registry, ReloadExecutor, ReloadOutcome, TrackedFile, normalize};
use crate::watch::{FileWatcher, OutcomeStream, WatchEvents};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Hot-reloads registered configuration files.
///
/// Each registered file is decoded into its destination once at
/// registration and again every time it changes on disk. Successful reloads
/// are published on the [reload stream](Self::reload_stream), failures on the
/// [error stream](Self::error_stream). A failed reload never replaces the
/// last good value.
///
/// Both streams are rendezvous-sized: a consumer that stops reading holds
/// back the whole pipeline until it resumes.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reload::prelude::*;
/// use serde::Deserialize;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Default, Deserialize)]
/// struct AppConfig {
///     port: u16,
/// }
///
/// # async fn example() -> Result<()> {
/// let reloader = ConfigReloader::new(CancellationToken::new())?;
///
/// let config = ConfigHandle::<AppConfig>::default();
/// reloader.add_configuration("config/app.json", config.clone())?;
/// println!("Port: {}", config.get().port);
///
/// let reloads = reloader.reload_stream();
/// while let Some(file) = reloads.recv().await {
///     println!("{} reloaded, port now {}", file.path().display(), config.get().port);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConfigReloader {
    registry: Arc<Registry>,
    watcher: Arc<FileWatcher>,
    options: ReloadOptions,
    shutdown: CancellationToken,
    relay: Mutex<Option<JoinHandle<()>>>,
    reloaded: OutcomeStream<Arc<TrackedFile>>,
    errors: OutcomeStream<ConfigError>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

impl ConfigReloader {
    /// Create a new builder for constructing a reloader.
    pub fn builder() -> ConfigReloaderBuilder {
        ConfigReloaderBuilder::new()
    }

    /// Create a reloader with default options.
    ///
    /// See [`ConfigReloaderBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns an error if the platform file watcher cannot be initialized.
    pub fn new(scope: CancellationToken) -> Result<Self> {
        Self::builder().build(scope)
    }

    pub(crate) fn start(scope: CancellationToken, builder: ConfigReloaderBuilder) -> Result<Self> {
        let options = builder.options;
        let shutdown = scope.child_token();
        let registry = Arc::new(Registry::new());

        let executor = ReloadExecutor::new(Arc::clone(&registry), options.file_rollback);
        #[cfg(feature = "metrics")]
        let executor = match &builder.metrics {
            Some(metrics) => executor.with_metrics(metrics.clone()),
            None => executor,
        };

        let (watcher, events) =
            FileWatcher::new(executor, options.debounce(), shutdown.child_token())?;
        let watcher = Arc::new(watcher);

        let (reloaded_tx, reloaded_rx) = mpsc::channel(1);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        let relay = tokio::spawn(relay(
            shutdown.clone(),
            Arc::clone(&watcher),
            events,
            reloaded_tx,
            errors_tx,
        ));

        debug!(
            file_rollback = options.file_rollback,
            debounce_ms = options.debounce_ms,
            "configuration reloader started"
        );

        Ok(Self {
            registry,
            watcher,
            options,
            shutdown,
            relay: Mutex::new(Some(relay)),
            reloaded: OutcomeStream::new(reloaded_rx),
            errors: OutcomeStream::new(errors_rx),
            #[cfg(feature = "metrics")]
            metrics: builder.metrics,
        })
    }

    /// Track a configuration file and decode it into `destination`.
    ///
    /// The file is read and decoded immediately, and from then on every time
    /// it changes. Registering a path that is already tracked does nothing;
    /// the first registration wins.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist or cannot be read
    /// - Its extension is not a supported format
    /// - Its current contents do not decode
    /// - The reloader has been stopped
    pub fn add_configuration<D>(&self, path: impl AsRef<Path>, destination: D) -> Result<()>
    where
        D: Destination,
    {
        if self.is_stopped() {
            return Err(ConfigError::Stopped);
        }

        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|source| ConfigError::Inaccessible {
                path: path.to_path_buf(),
                source,
            })?;

        if self.registry.contains(&canonical) {
            debug!(path = %canonical.display(), "configuration already tracked");
            return Ok(());
        }

        let file = TrackedFile::load(canonical, Arc::new(destination), self.options.file_rollback)?;
        let (file, inserted) = self.registry.add(file);
        if !inserted {
            return Ok(());
        }

        if let Err(err) = self.watcher.watch(file.path()) {
            self.registry.remove(file.path());
            return Err(err);
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.update_tracked_files(self.registry.len());
        }

        info!(path = %file.path().display(), format = ?file.format(), "tracking configuration file");
        Ok(())
    }

    /// Stop tracking a configuration file.
    ///
    /// A change that has not settled yet is discarded. Returns `false` if the
    /// path was not tracked.
    pub fn remove_configuration(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize(path);
        self.watcher.unwatch(&path);
        let removed = self.registry.remove(&path).is_some();

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.update_tracked_files(self.registry.len());
        }

        if removed {
            info!(path = %path.display(), "stopped tracking configuration file");
        }
        removed
    }

    /// Look up a tracked file. Relative paths are resolved at call time.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<TrackedFile>> {
        self.registry.get(path)
    }

    /// Canonical paths of all tracked files.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.registry.paths()
    }

    /// Stream of successfully reloaded files.
    pub fn reload_stream(&self) -> OutcomeStream<Arc<TrackedFile>> {
        self.reloaded.clone()
    }

    /// Stream of reload failures. Every error names the failing file.
    pub fn error_stream(&self) -> OutcomeStream<ConfigError> {
        self.errors.clone()
    }

    /// The options this reloader was built with.
    pub fn options(&self) -> &ReloadOptions {
        &self.options
    }

    /// Whether the reloader has stopped or is stopping.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop watching and close both outcome streams.
    ///
    /// Waits until the streams are closed. Safe to call more than once and
    /// after the scope has already been cancelled.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            let _ = relay.await;
        }
    }
}

impl Drop for ConfigReloader {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Fan the watcher's outcomes onto the public streams until shutdown.
///
/// Outcomes are forwarded one at a time in arrival order. Dropping the public
/// senders on exit is what closes the streams, and that only happens after
/// the watcher has been stopped.
async fn relay(
    shutdown: CancellationToken,
    watcher: Arc<FileWatcher>,
    mut events: WatchEvents,
    reloaded: mpsc::Sender<Arc<TrackedFile>>,
    errors: mpsc::Sender<ConfigError>,
) {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            outcome = events.recv() => match outcome {
                Some(outcome) => outcome,
                None => break,
            },
        };

        let sent = match outcome {
            ReloadOutcome::Reloaded(file) => tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = reloaded.send(file) => sent.is_ok(),
            },
            ReloadOutcome::Failed(err) => tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = errors.send(err) => sent.is_ok(),
            },
        };
        if !sent {
            break;
        }
    }

    watcher.stop();
    debug!("configuration reloader stopped, closing outcome streams");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigHandle;
    use serde::Deserialize;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[derive(Debug, Clone, Default, Deserialize, PartialEq)]
    struct TestConfig {
        port: u16,
    }

    fn reloader() -> ConfigReloader {
        ConfigReloader::builder()
            .with_debounce(Duration::from_millis(100))
            .build(CancellationToken::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_configuration_loads_initial_value() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"port": 8080}"#).unwrap();

        let reloader = reloader();
        let handle = ConfigHandle::<TestConfig>::default();
        reloader.add_configuration(&config_path, handle.clone()).unwrap();

        assert_eq!(handle.get().port, 8080);
        assert_eq!(reloader.tracked_paths().len(), 1);
        let file = reloader.get(&config_path).unwrap();
        assert_eq!(file.snapshot::<TestConfig>().unwrap().port, 8080);
    }

    #[tokio::test]
    async fn test_add_configuration_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"port": 8080}"#).unwrap();

        let reloader = reloader();
        let first = ConfigHandle::<TestConfig>::default();
        let second = ConfigHandle::<TestConfig>::default();
        reloader.add_configuration(&config_path, first.clone()).unwrap();
        reloader.add_configuration(&config_path, second.clone()).unwrap();

        assert_eq!(reloader.tracked_paths().len(), 1);
        assert_eq!(reloader.watcher.watched_paths().len(), 1);
        assert_eq!(second.get().port, 0);
    }

    #[tokio::test]
    async fn test_add_inaccessible_path() {
        let reloader = reloader();
        let result = reloader.add_configuration(
            "/nonexistent/config.json",
            ConfigHandle::<TestConfig>::default(),
        );

        assert!(matches!(result, Err(ConfigError::Inaccessible { .. })));
        assert!(reloader.tracked_paths().is_empty());
    }

    #[tokio::test]
    async fn test_remove_configuration() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "port: 8080\n").unwrap();

        let reloader = reloader();
        reloader
            .add_configuration(&config_path, ConfigHandle::<TestConfig>::default())
            .unwrap();

        assert!(reloader.remove_configuration(&config_path));
        assert!(!reloader.remove_configuration(&config_path));
        assert!(reloader.get(&config_path).is_none());
        assert!(reloader.watcher.watched_paths().is_empty());
    }

    #[tokio::test]
    async fn test_stop_closes_streams() {
        let reloader = reloader();
        let reloads = reloader.reload_stream();
        let errors = reloader.error_stream();

        reloader.stop().await;
        reloader.stop().await;

        assert!(reloader.is_stopped());
        let closed = timeout(Duration::from_secs(1), async {
            (reloads.recv().await.is_none(), errors.recv().await.is_none())
        })
        .await
        .unwrap();
        assert_eq!(closed, (true, true));
    }

    #[tokio::test]
    async fn test_add_after_stop_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"port": 8080}"#).unwrap();

        let reloader = reloader();
        reloader.stop().await;

        let result = reloader.add_configuration(&config_path, ConfigHandle::<TestConfig>::default());
        assert!(matches!(result, Err(ConfigError::Stopped)));
    }
}
