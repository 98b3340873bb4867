//! # config-reload
//!
//! Hot-reload on-disk configuration files into typed values.
//!
//! ## Overview
//!
//! `config-reload` watches registered configuration files, re-parses each
//! one when it changes on disk, and reports the result on two streams:
//! - Successfully reloaded files, carrying the new value
//! - Errors, each naming the file that failed
//!
//! A failed reload never replaces the last good value, and can optionally
//! write the last good contents back to disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use config_reload::prelude::*;
//! use serde::Deserialize;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct AppConfig {
//!     port: u16,
//! }
//!
//! # async fn example() -> config_reload::error::Result<()> {
//! let scope = CancellationToken::new();
//! let reloader = ConfigReloader::builder()
//!     .with_file_rollback(true)
//!     .build(scope.clone())?;
//!
//! let config = ConfigHandle::<AppConfig>::default();
//! reloader.add_configuration("config/app.yaml", config.clone())?;
//!
//! // Lock-free reads of the latest good value
//! println!("Port: {}", config.get().port);
//!
//! let errors = reloader.error_stream();
//! tokio::spawn(async move {
//!     while let Some(err) = errors.recv().await {
//!         eprintln!("config error: {err}");
//!     }
//! });
//!
//! // Cancelling the scope stops watching and closes both streams
//! scope.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Typed destinations**: decode YAML, TOML or JSON into any `serde` type
//! - **Debounced watching**: bursts of writes from one save reload once
//! - **Last good value**: readers never observe a partially decoded value
//! - **Rollback**: optionally restore the last good file contents on disk
//! - **Independent pipelines**: no global state; run as many reloaders as needed
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry reload metrics via `ConfigReloaderBuilder::with_metrics`

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod tracking;
pub mod watch;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ConfigHandle, ConfigReloader, ConfigReloaderBuilder, ReloadOptions};
    pub use crate::error::{ConfigError, Result};
    pub use crate::tracking::TrackedFile;
    pub use crate::watch::OutcomeStream;
}
