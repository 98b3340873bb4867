//! In-memory registry of tracked configuration files.

use crate::core::{Destination, Format, Snapshot};
use crate::error::{ConfigError, Result};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Last successfully loaded state of a tracked file.
#[derive(Clone)]
pub(crate) struct Loaded {
    snapshot: Snapshot,
    raw: Option<Arc<[u8]>>,
    version: u64,
    loaded_at: Instant,
}

/// A configuration file monitored for changes.
///
/// Holds the canonical path, the caller's destination, and the last good
/// snapshot. The snapshot and raw bytes are swapped atomically, and only by
/// the reload executor, so readers always see a consistent pair.
pub struct TrackedFile {
    path: PathBuf,
    format: Format,
    destination: Arc<dyn Destination>,
    state: ArcSwap<Loaded>,
    restored: AtomicBool,
}

impl TrackedFile {
    /// Read and decode `path` for the first time.
    ///
    /// `path` must already be canonical. When `keep_raw` is false the file
    /// bytes are dropped after decoding. The decoded value is published to
    /// the destination.
    pub(crate) fn load(
        path: PathBuf,
        destination: Arc<dyn Destination>,
        keep_raw: bool,
    ) -> Result<Self> {
        let format = Format::from_path(&path)?;
        let raw = std::fs::read(&path).map_err(|source| ConfigError::Inaccessible {
            path: path.clone(),
            source,
        })?;
        let snapshot = decode_with(destination.as_ref(), &path, &raw, format)?;
        destination.publish(&snapshot);

        Ok(Self {
            state: ArcSwap::from_pointee(Loaded {
                snapshot,
                raw: keep_raw.then(|| Arc::from(raw)),
                version: 0,
                loaded_at: Instant::now(),
            }),
            path,
            format,
            destination,
            restored: AtomicBool::new(false),
        })
    }

    /// The canonical absolute path of this file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The format detected at registration.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of successful reloads since registration.
    pub fn version(&self) -> u64 {
        self.state.load().version
    }

    /// When the current snapshot was loaded.
    pub fn loaded_at(&self) -> Instant {
        self.state.load().loaded_at
    }

    /// The last successfully decoded value, if it is a `T`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use config_reload::tracking::TrackedFile;
    /// # #[derive(serde::Deserialize)] struct AppConfig { port: u16 }
    /// # fn example(file: &TrackedFile) {
    /// if let Some(cfg) = file.snapshot::<AppConfig>() {
    ///     println!("port is now {}", cfg.port);
    /// }
    /// # }
    /// ```
    pub fn snapshot<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        Arc::clone(&self.state.load().snapshot).downcast::<T>().ok()
    }

    /// The type-erased last good snapshot.
    pub fn raw_snapshot(&self) -> Snapshot {
        Arc::clone(&self.state.load().snapshot)
    }

    /// Last good file contents. Only kept when rollback is enabled.
    pub fn raw_bytes(&self) -> Option<Arc<[u8]>> {
        self.state.load().raw.clone()
    }

    pub(crate) fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    /// Swap in a freshly decoded snapshot and publish it.
    pub(crate) fn commit(&self, snapshot: Snapshot, raw: Option<Arc<[u8]>>) {
        let version = self.state.load().version + 1;
        self.state.store(Arc::new(Loaded {
            snapshot: Arc::clone(&snapshot),
            raw,
            version,
            loaded_at: Instant::now(),
        }));
        self.destination.publish(&snapshot);
    }

    pub(crate) fn mark_restored(&self) {
        self.restored.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_restored(&self) -> bool {
        self.restored.swap(false, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TrackedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedFile")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Decode `raw` through `destination`, naming `path` on failure.
pub(crate) fn decode_with(
    destination: &dyn Destination,
    path: &Path,
    raw: &[u8],
    format: Format,
) -> Result<Snapshot> {
    let source = std::str::from_utf8(raw).map_err(|e| ConfigError::Decode {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;

    destination
        .decode(source, format)
        .map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Resolve `path` against the current working directory.
///
/// The working directory is read on every call, so a relative path can
/// resolve differently if the process changes directory between calls.
/// Symlinks are resolved when the file, or failing that its parent
/// directory, exists.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }

    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|dir| dir.join(name)),
        _ => None,
    };
    resolved.unwrap_or(absolute)
}

/// Registry of tracked files keyed by canonical path.
///
/// Each reloader owns its own registry; nothing is shared between
/// independent pipelines in the same process.
#[derive(Default)]
pub struct Registry {
    files: RwLock<HashMap<PathBuf, Arc<TrackedFile>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `file` unless its path is already tracked.
    ///
    /// Returns the entry now stored for the path and whether `file` was the
    /// one inserted. The first registration for a path always wins.
    pub fn add(&self, file: TrackedFile) -> (Arc<TrackedFile>, bool) {
        let mut files = self.files.write();
        if let Some(existing) = files.get(file.path()) {
            return (Arc::clone(existing), false);
        }

        let file = Arc::new(file);
        files.insert(file.path().to_path_buf(), Arc::clone(&file));
        (file, true)
    }

    /// Look up a tracked file. Relative paths are resolved at call time.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<TrackedFile>> {
        let path = normalize(path);
        self.files.read().get(&path).cloned()
    }

    /// Whether `path` is tracked.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// Stop tracking `path`. Does nothing if it is not tracked.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Arc<TrackedFile>> {
        let path = normalize(path);
        self.files.write().remove(&path)
    }

    /// Canonical paths of all tracked files.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether no files are tracked.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}
