use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::{NamedTempFile, PathPersistError, TempPath};

use crate::data::{FetchRequest, Progress, ResponseMeta, TransferMode};

const UNKNOWN: u64 = u64::MAX;

/// Live byte counters of one in-flight transfer.
///
/// The client writes them as bytes arrive; the fetch driver samples them.
#[derive(Debug)]
pub struct TransferCounters {
    received: AtomicU64,
    expected: AtomicU64,
}

impl Default for TransferCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferCounters {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            expected: AtomicU64::new(UNKNOWN),
        }
    }

    /// Record `len` more received bytes.
    pub fn add_received(&self, len: u64) {
        self.received.fetch_add(len, Ordering::Relaxed);
    }

    /// Record the total received so far. Smaller values than the current one are ignored.
    pub fn set_received(&self, total: u64) {
        self.received.fetch_max(total, Ordering::Relaxed);
    }

    /// Record the expected total, or `None` when it is not known.
    pub fn set_expected(&self, expected: Option<u64>) {
        self.expected
            .store(expected.unwrap_or(UNKNOWN), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Progress {
        let expected = self.expected.load(Ordering::Relaxed);
        Progress {
            bytes_received: self.received.load(Ordering::Relaxed),
            bytes_expected: (expected != UNKNOWN).then_some(expected),
        }
    }
}

/// A downloaded file at a location owned by the client.
///
/// The file is deleted when this value is dropped, so it stays valid only
/// until the fetch driver has moved it under the cache root.
#[derive(Debug)]
pub struct TransientFile {
    path: TempPath,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn persist(self, destination: &Path) -> Result<(), PathPersistError> {
        self.path.persist(destination)
    }
}

impl From<TempPath> for TransientFile {
    fn from(path: TempPath) -> Self {
        Self { path }
    }
}

impl From<NamedTempFile> for TransientFile {
    fn from(file: NamedTempFile) -> Self {
        Self {
            path: file.into_temp_path(),
        }
    }
}

/// Response body as delivered by the client.
#[derive(Debug)]
pub enum Body {
    Bytes(Bytes),
    File(TransientFile),
}

/// What the client reports once a transfer ends without a transport error.
///
/// Either part may be missing; the fetch driver classifies that as a failure.
#[derive(Debug, Default)]
pub struct Completion {
    pub response: Option<ResponseMeta>,
    pub body: Option<Body>,
}

impl Completion {
    pub fn data(response: ResponseMeta, body: impl Into<Bytes>) -> Self {
        Self {
            response: Some(response),
            body: Some(Body::Bytes(body.into())),
        }
    }

    pub fn file(response: ResponseMeta, file: impl Into<TransientFile>) -> Self {
        Self {
            response: Some(response),
            body: Some(Body::File(file.into())),
        }
    }
}

/// The HTTP facility that performs the actual network I/O.
///
/// Implementations update `counters` while the transfer runs. Dropping the
/// returned future must cancel the transfer.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Scripted implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    /// Error type for transport failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute `request`, delivering the body as bytes or as a transient file
    /// depending on `mode`.
    fn execute(
        &self,
        request: &FetchRequest,
        mode: TransferMode,
        counters: Arc<TransferCounters>,
    ) -> impl Future<Output = Result<Completion, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::io;
    use std::path::PathBuf;

    use bytes::BytesMut;
    use thiserror::Error;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::config::FetchConfig;

    #[derive(Debug, Error)]
    pub enum ReqwestClientError {
        #[error(transparent)]
        Http(#[from] reqwest::Error),

        #[error("staging file error: {0}")]
        Io(#[from] io::Error),

        #[error("invalid HTTP method: {0}")]
        InvalidMethod(String),
    }

    /// Production HTTP client implementation using reqwest.
    ///
    /// In file mode the body is streamed into a temporary file under the
    /// staging directory, named with the URL's extension.
    pub struct ReqwestClient {
        client: reqwest::Client,
        staging_dir: PathBuf,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with default configuration.
        pub fn new(staging_dir: impl Into<PathBuf>) -> Result<Self, ReqwestClientError> {
            let client = reqwest::Client::builder().build()?;
            Ok(Self::with_client(client, staging_dir))
        }

        pub fn from_config(config: &FetchConfig) -> Result<Self, ReqwestClientError> {
            Self::new(&config.staging_dir)
        }

        pub fn with_client(client: reqwest::Client, staging_dir: impl Into<PathBuf>) -> Self {
            Self {
                client,
                staging_dir: staging_dir.into(),
            }
        }
    }

    fn response_meta(response: &reqwest::Response) -> ResponseMeta {
        ResponseMeta {
            url: response.url().to_string(),
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(key, value)| {
                    (
                        key.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = ReqwestClientError;

        async fn execute(
            &self,
            request: &FetchRequest,
            mode: TransferMode,
            counters: Arc<TransferCounters>,
        ) -> Result<Completion, Self::Error> {
            let method = reqwest::Method::from_bytes(request.method().as_bytes())
                .map_err(|_| ReqwestClientError::InvalidMethod(request.method().to_string()))?;

            let mut builder = self.client.request(method, request.url());
            for (key, value) in request.headers() {
                builder = builder.header(key, value);
            }

            let mut response = builder.send().await?;
            counters.set_expected(response.content_length());
            let meta = response_meta(&response);

            let body = match mode {
                TransferMode::Buffered => {
                    let mut buffer = BytesMut::new();
                    while let Some(chunk) = response.chunk().await? {
                        buffer.extend_from_slice(&chunk);
                        counters.add_received(chunk.len() as u64);
                    }
                    Body::Bytes(buffer.freeze())
                }
                TransferMode::ToTemporaryFile => {
                    tokio::fs::create_dir_all(&self.staging_dir).await?;
                    let suffix = request
                        .path_extension()
                        .map(|ext| format!(".{ext}"))
                        .unwrap_or_default();
                    let staged = tempfile::Builder::new()
                        .prefix(".fetch-")
                        .suffix(&suffix)
                        .tempfile_in(&self.staging_dir)?;

                    // The path deletes the file if this future is dropped mid-transfer.
                    let (file, path) = staged.into_parts();
                    let mut file = tokio::fs::File::from_std(file);
                    while let Some(chunk) = response.chunk().await? {
                        file.write_all(&chunk).await?;
                        counters.add_received(chunk.len() as u64);
                    }
                    file.flush().await?;
                    Body::File(TransientFile::from(path))
                }
            };

            Ok(Completion {
                response: Some(meta),
                body: Some(body),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ReqwestClient, ReqwestClientError};
