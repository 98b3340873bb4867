//! Filesystem watching and outcome delivery.
//!
//! [`FileWatcher`] turns raw filesystem notifications into debounced reloads
//! and reports each outcome on internal channels. [`OutcomeStream`] is the
//! receive-only view of the public streams the reloader relays them onto.

pub mod stream;
pub mod watcher;

pub use stream::OutcomeStream;
pub use watcher::{FileWatcher, WatchEvents, WatchState};
