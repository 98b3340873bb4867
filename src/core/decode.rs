//! Structured-text decoding for tracked files.

use crate::error::{ConfigError, DecodeError, Result};
use config::FileStoredFormat;
use serde::de::DeserializeOwned;
use std::path::Path;

/// File formats understood by the default decoder.
///
/// The format is detected from the file extension when a file is registered
/// and stays fixed for the lifetime of the tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl Format {
    const ALL: [Self; 3] = [Self::Yaml, Self::Toml, Self::Json];

    /// Detect the format of `path` from its extension, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] if the extension is missing
    /// or not one of `yaml`, `yml`, `toml`, `json`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use config_reload::core::Format;
    ///
    /// assert_eq!(Format::from_path("app/config.yml").unwrap(), Format::Yaml);
    /// assert!(Format::from_path("app/config.ini").is_err());
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        extension
            .and_then(|ext| {
                Self::ALL
                    .into_iter()
                    .find(|format| format.extensions().contains(&ext.as_str()))
            })
            .ok_or_else(|| ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    /// File extensions registered for this format, lowercase.
    pub fn extensions(self) -> &'static [&'static str] {
        config::FileFormat::from(self).file_extensions()
    }
}

impl From<Format> for config::FileFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Yaml => config::FileFormat::Yaml,
            Format::Toml => config::FileFormat::Toml,
            Format::Json => config::FileFormat::Json,
        }
    }
}

/// Decode `source` into a fresh `T`.
///
/// Keys reach serde exactly as written in the file, so field names and
/// `#[serde(rename)]` attributes match case-sensitively. The caller's
/// existing value is never touched, so a failed decode cannot leave a
/// half-written destination behind.
///
/// # Examples
///
/// ```rust
/// use config_reload::core::{decode, Format};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Server {
///     #[serde(rename = "Port")]
///     port: u16,
/// }
///
/// let server: Server = decode(r#"{"Port": 8080}"#, Format::Json).unwrap();
/// assert_eq!(server.port, 8080);
/// ```
pub fn decode<T>(source: &str, format: Format) -> std::result::Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let value = match format {
        Format::Yaml => serde_yaml::from_str(source)?,
        Format::Toml => toml::from_str(source)?,
        Format::Json => serde_json::from_str(source)?,
    };
    Ok(value)
}
