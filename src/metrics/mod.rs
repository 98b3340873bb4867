//! Built-in metrics for reload operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts/success/failures
//! - Reload duration
//! - Rollback results
//! - Tracked file count
//!
//! # Examples
//!
//! ```rust,no_run
//! use config_reload::prelude::*;
//! use opentelemetry::global;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<()> {
//! let reloader = ConfigReloader::builder()
//!     .with_metrics(global::meter("my-app"))
//!     .build(CancellationToken::new())?;
//! # Ok(())
//! # }
//! ```

mod reload_metrics;

pub use reload_metrics::ReloadMetrics;
