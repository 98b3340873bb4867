//! Tracked file registry and the reload executor.
//!
//! The registry owns one [`TrackedFile`] per canonical path. The executor
//! is the only component that mutates an entry, re-reading and re-decoding
//! it when the watcher reports a settled change.

mod executor;
mod registry;

pub use executor::{ReloadExecutor, ReloadOutcome};
pub use registry::{Registry, TrackedFile, normalize};
