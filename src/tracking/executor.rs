//! Re-reads and re-decodes tracked files.

use crate::error::ConfigError;
use crate::tracking::registry::{Registry, TrackedFile, decode_with, normalize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Result of one reload attempt for one path.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The file decoded cleanly and its entry now holds the new snapshot.
    Reloaded(Arc<TrackedFile>),
    /// The reload failed; the entry still holds its previous snapshot.
    Failed(ConfigError),
}

impl ReloadOutcome {
    /// Whether the reload succeeded.
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Self::Reloaded(_))
    }
}

/// Reloads one tracked file at a time.
///
/// The executor is the only writer of a tracked file's snapshot and raw
/// bytes. Callers must not run two reloads for the same path concurrently;
/// the file watcher guarantees this with a per-path gate.
#[derive(Clone)]
pub struct ReloadExecutor {
    registry: Arc<Registry>,
    rollback: bool,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

impl ReloadExecutor {
    /// Create an executor over `registry`.
    ///
    /// When `rollback` is true, a failed reload writes the last good contents
    /// back to disk.
    pub fn new(registry: Arc<Registry>, rollback: bool) -> Self {
        Self {
            registry,
            rollback,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record reload metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: ReloadMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The registry this executor writes to.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Re-read and re-decode `path`.
    ///
    /// Returns `None` when the file holds exactly the contents a previous
    /// rollback wrote back, since that change is the echo of the restore
    /// rather than an external edit.
    pub fn reload(&self, path: &Path) -> Option<ReloadOutcome> {
        let Some(file) = self.registry.get(path) else {
            return Some(ReloadOutcome::Failed(ConfigError::NotTracked {
                path: normalize(path),
            }));
        };

        let raw = match std::fs::read(file.path()) {
            Ok(raw) => raw,
            Err(source) => {
                let err = ConfigError::Read {
                    path: file.path().to_path_buf(),
                    source,
                };
                return Some(ReloadOutcome::Failed(self.fail(&file, err)));
            }
        };

        if file.take_restored() && file.raw_bytes().as_deref() == Some(raw.as_slice()) {
            debug!(path = %file.path().display(), "ignoring change written by rollback");
            return None;
        }

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(ReloadMetrics::start_reload);

        match decode_with(file.destination(), file.path(), &raw, file.format()) {
            Ok(snapshot) => {
                let raw = self.rollback.then(|| Arc::from(raw));
                file.commit(snapshot, raw);

                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_reload_success(timer);
                }

                info!(
                    path = %file.path().display(),
                    version = file.version(),
                    "configuration reloaded"
                );
                Some(ReloadOutcome::Reloaded(file))
            }
            Err(err) => {
                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_reload_failure(timer);
                }

                Some(ReloadOutcome::Failed(self.fail(&file, err)))
            }
        }
    }

    /// Handle a failed reload, restoring the last good bytes if enabled.
    fn fail(&self, file: &TrackedFile, err: ConfigError) -> ConfigError {
        warn!(path = %file.path().display(), error = %err, "reload failed, keeping last good configuration");

        if !self.rollback {
            return err;
        }
        let Some(good) = file.raw_bytes() else {
            return err;
        };

        match std::fs::write(file.path(), &good) {
            Ok(()) => {
                file.mark_restored();
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_rollback(true);
                }
                info!(path = %file.path().display(), "restored last good configuration on disk");
                err
            }
            Err(source) => {
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_rollback(false);
                }
                warn!(path = %file.path().display(), error = %source, "failed to restore last good configuration");
                ConfigError::Rollback {
                    path: file.path().to_path_buf(),
                    source,
                    reload: Box::new(err),
                }
            }
        }
    }
}
