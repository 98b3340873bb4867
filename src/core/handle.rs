//! Caller-owned destinations that reloaded files are decoded into.

use crate::core::{Format, decode};
use crate::error::DecodeError;
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::Arc;

/// Opaque, type-erased value produced by a successful decode.
pub type Snapshot = Arc<dyn Any + Send + Sync>;

/// Destination a tracked file is decoded into.
///
/// Decoding and publishing are split so a value only becomes visible after
/// it decoded cleanly: the reloader calls [`decode`](Destination::decode),
/// stores the result as the file's last-good snapshot, and only then calls
/// [`publish`](Destination::publish).
///
/// [`ConfigHandle`] implements this for any `serde` deserializable type.
/// Implement it directly to plug in a different decoder.
pub trait Destination: Send + Sync + 'static {
    /// Decode the file contents into a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error if `source` does not describe a valid value.
    fn decode(&self, source: &str, format: Format) -> Result<Snapshot, DecodeError>;

    /// Make a snapshot produced by [`decode`](Destination::decode) current.
    fn publish(&self, snapshot: &Snapshot);
}

/// Shared handle to the current value of one configuration file.
///
/// Uses `arc-swap` internally, so reads are lock-free and never observe a
/// partially updated value. Clones share the same underlying value; register
/// one clone with the reloader and keep another for reading.
///
/// # Examples
///
/// ```rust
/// use config_reload::core::ConfigHandle;
///
/// let handle = ConfigHandle::new(42);
/// assert_eq!(*handle.get(), 42);
/// ```
pub struct ConfigHandle<T> {
    current: Arc<ArcSwap<T>>,
}

impl<T> ConfigHandle<T> {
    /// Create a handle holding `initial` until the file is first decoded.
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(ArcSwap::new(Arc::new(initial))),
        }
    }

    /// Get a reference-counted handle to the current value.
    ///
    /// This operation is lock-free; readers never block the reloader.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the current value.
    pub fn store(&self, value: Arc<T>) {
        self.current.store(value);
    }
}

impl<T: Default> Default for ConfigHandle<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for ConfigHandle<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T> std::fmt::Debug for ConfigHandle<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("current", &self.get())
            .finish()
    }
}

impl<T> Destination for ConfigHandle<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn decode(&self, source: &str, format: Format) -> Result<Snapshot, DecodeError> {
        let value: T = decode(source, format)?;
        Ok(Arc::new(value))
    }

    fn publish(&self, snapshot: &Snapshot) {
        if let Ok(value) = Arc::clone(snapshot).downcast::<T>() {
            self.current.store(value);
        }
    }
}
