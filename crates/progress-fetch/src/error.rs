//! Error types for progress-fetch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by an [`HttpClient`](crate::HttpClient) implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal failure of a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("no response was returned")]
    InvalidResponse,

    #[error("response carried no payload")]
    MissingPayload,

    #[error("failed to relocate download to {}: {source}", path.display())]
    RelocationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Transport(Box::new(err))
    }
}

/// Terminal failure of a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The first fetch to fail, with its position in the input.
    #[error("fetch #{index} failed: {source}")]
    Failed {
        index: usize,
        #[source]
        source: FetchError,
    },

    #[error("batch coordinator stopped: {0}")]
    Aborted(String),
}

impl BatchError {
    /// Index of the failed request, if the batch failed on a fetch.
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            BatchError::Failed { index, .. } => Some(*index),
            BatchError::Aborted(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
