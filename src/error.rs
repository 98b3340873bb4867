//! Error types for config-reload.

use std::path::{Path, PathBuf};

/// Result type alias for config-reload operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Boxed error returned by a [`Destination`](crate::core::Destination) that failed to decode.
pub type DecodeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while tracking and reloading configuration files.
///
/// Registration and construction errors are returned directly to the caller.
/// Reload-time errors are delivered on the error stream and always name the
/// file they concern (see [`ConfigError::path`]).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be resolved or accessed at registration time.
    #[error("configuration file {} is not accessible: {source}", path.display())]
    Inaccessible {
        /// The path as supplied by the caller
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not map to a supported format.
    #[error(
        "unsupported configuration format for {}: expected .yaml, .yml, .toml or .json",
        path.display()
    )]
    UnsupportedFormat {
        /// The offending path
        path: PathBuf,
    },

    /// Reading the file contents failed during a reload.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        /// The tracked path
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The file contents could not be decoded into the destination.
    #[error("error loading new config {}: {source}", path.display())]
    Decode {
        /// The tracked path
        path: PathBuf,
        /// The decoder's error
        #[source]
        source: DecodeError,
    },

    /// A reload failed and restoring the last good contents failed as well.
    #[error("failed to restore {} after reload error ({reload}): {source}", path.display())]
    Rollback {
        /// The tracked path
        path: PathBuf,
        /// The error raised while writing the last good contents back
        #[source]
        source: std::io::Error,
        /// The reload failure that triggered the restore
        reload: Box<ConfigError>,
    },

    /// The path is not tracked by this reloader.
    #[error("configuration file {} is not tracked", path.display())]
    NotTracked {
        /// The normalized path that was looked up
        path: PathBuf,
    },

    /// File watching failed to initialize or to subscribe to a path.
    #[error("File watching error: {0}")]
    Watch(#[from] notify::Error),

    /// The reloader has been stopped.
    #[error("configuration reloader has been stopped")]
    Stopped,
}

impl ConfigError {
    /// The file this error concerns, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Inaccessible { path, .. }
            | Self::UnsupportedFormat { path }
            | Self::Read { path, .. }
            | Self::Decode { path, .. }
            | Self::Rollback { path, .. }
            | Self::NotTracked { path } => Some(path),
            Self::Watch(err) => err.paths.first().map(PathBuf::as_path),
            Self::Stopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_path() {
        let err = ConfigError::Decode {
            path: PathBuf::from("/etc/app/config.json"),
            source: "expected value at line 1 column 2".into(),
        };

        let message = err.to_string();
        assert!(message.contains("/etc/app/config.json"));
        assert!(message.contains("expected value"));
        assert_eq!(err.path(), Some(Path::new("/etc/app/config.json")));
    }

    #[test]
    fn test_rollback_error_keeps_reload_cause() {
        let reload = ConfigError::Decode {
            path: PathBuf::from("/tmp/app.toml"),
            source: "bad toml".into(),
        };
        let err = ConfigError::Rollback {
            path: PathBuf::from("/tmp/app.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            reload: Box::new(reload),
        };

        let message = err.to_string();
        assert!(message.contains("bad toml"));
        assert!(message.contains("read-only"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stopped_has_no_path() {
        assert!(ConfigError::Stopped.path().is_none());
    }
}
