use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_DIR_NAME: &str = "progress-fetch";

/// Configuration shared by a [`Fetcher`](crate::Fetcher) and the fetches it issues.
///
/// Every field has a default, so a config file only needs to name what it
/// changes:
///
/// ```toml
/// cache_dir = "/var/cache/thumbs"
/// progress_interval_ms = 25
/// ```
///
/// # Examples
///
/// ```
/// use progress_fetch::FetchConfig;
/// use std::time::Duration;
///
/// let config = FetchConfig::default()
///     .cache_dir("/tmp/thumbs")
///     .progress_interval_ms(25);
/// assert_eq!(config.progress_interval(), Duration::from_millis(25));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory that downloaded files are moved into before delivery.
    ///
    /// Files placed here belong to the consumer once delivered.
    ///
    /// Default: `<system temp>/progress-fetch`
    pub cache_dir: PathBuf,

    /// Directory where [`ReqwestClient`](crate::ReqwestClient) streams
    /// transient files while a download is in flight.
    ///
    /// Default: `<system temp>/progress-fetch/staging`
    pub staging_dir: PathBuf,

    /// Minimum spacing between two progress samples of one fetch.
    ///
    /// Default: 10
    pub progress_interval_ms: u64,

    /// Capacity of the channel between a fetch driver and its stream.
    ///
    /// Default: 64
    pub channel_capacity: usize,

    /// Default number of fetches a batch keeps active at once.
    ///
    /// Default: 4
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let root = std::env::temp_dir().join(DEFAULT_DIR_NAME);
        Self {
            staging_dir: root.join("staging"),
            cache_dir: root,
            progress_interval_ms: 10,
            channel_capacity: 64,
            max_concurrent: 4,
        }
    }
}

impl FetchConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Set the progress sampling interval in milliseconds. Zero is read as 1ms.
    #[must_use]
    pub fn progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    pub(crate) fn effective_channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}
