//! Builder for constructing ConfigReloader instances.

use crate::core::ConfigReloader;
use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Tunable behaviour of a [`ConfigReloader`].
///
/// Derives `Deserialize` so a host application can embed it in its own
/// configuration; missing fields fall back to their defaults.
///
/// # Examples
///
/// ```rust
/// use config_reload::core::ReloadOptions;
///
/// let options = ReloadOptions::default();
/// assert!(!options.file_rollback);
/// assert_eq!(options.debounce().as_millis(), 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReloadOptions {
    /// Restore the last good file contents on disk when a reload fails.
    pub file_rollback: bool,
    /// How long a file must be quiet before it is reloaded.
    pub debounce_ms: u64,
}

impl ReloadOptions {
    /// The debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            file_rollback: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Builder for constructing a `ConfigReloader`.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reload::prelude::*;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<()> {
/// let reloader = ConfigReloader::builder()
///     .with_file_rollback(true)
///     .with_debounce(Duration::from_millis(250))
///     .build(CancellationToken::new())?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ConfigReloaderBuilder {
    pub(crate) options: ReloadOptions,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<ReloadMetrics>,
}

impl ConfigReloaderBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn with_options(mut self, options: ReloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Restore the last good contents on disk when a reload fails.
    ///
    /// Disabled by default.
    pub fn with_file_rollback(mut self, enabled: bool) -> Self {
        self.options.file_rollback = enabled;
        self
    }

    /// Set how long a file must be quiet before it is reloaded.
    ///
    /// Defaults to 500ms.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.options.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Record OpenTelemetry metrics for reloads.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ReloadMetrics::new(meter));
        self
    }

    /// The options collected so far.
    pub fn options(&self) -> &ReloadOptions {
        &self.options
    }

    /// Build the reloader and start watching.
    ///
    /// `scope` is the cancellation root: cancelling it stops the reloader and
    /// closes both outcome streams. Must be called from within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform file watcher cannot be initialized.
    pub fn build(self, scope: CancellationToken) -> Result<ConfigReloader> {
        ConfigReloader::start(scope, self)
    }
}
