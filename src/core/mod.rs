//! Core reloader types.

mod builder;
mod decode;
mod handle;
mod reloader;

pub use builder::{ConfigReloaderBuilder, DEFAULT_DEBOUNCE_MS, ReloadOptions};
pub use decode::{Format, decode};
pub use handle::{ConfigHandle, Destination, Snapshot};
pub use reloader::ConfigReloader;
