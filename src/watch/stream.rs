//! Receive-only outcome streams handed to consumers.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Receive side of one of the reloader's outcome streams.
///
/// Clones share the same underlying channel: each outcome is delivered to
/// exactly one of the clones that are waiting in [`recv`](Self::recv). The
/// stream yields `None` once the reloader has shut down.
///
/// # Examples
///
/// ```rust,no_run
/// # use config_reload::prelude::*;
/// # async fn example(reloader: ConfigReloader) {
/// let errors = reloader.error_stream();
/// while let Some(err) = errors.recv().await {
///     eprintln!("config error: {err}");
/// }
/// # }
/// ```
pub struct OutcomeStream<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> OutcomeStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next outcome.
    ///
    /// Returns `None` when the stream has been closed by shutdown.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Take an outcome if one is ready, without waiting.
    ///
    /// Returns `None` if nothing is pending, if another clone is currently
    /// receiving, or if the stream is closed.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

impl<T> Clone for OutcomeStream<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> std::fmt::Debug for OutcomeStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeStream").finish_non_exhaustive()
    }
}
