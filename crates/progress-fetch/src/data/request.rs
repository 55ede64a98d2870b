use std::fmt;
use std::sync::Arc;

/// How a successful response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// The whole body is held in memory.
    #[default]
    Buffered,

    /// The body is written to a file which is moved under the cache root.
    ToTemporaryFile,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Buffered => write!(f, "buffered"),
            TransferMode::ToTemporaryFile => write!(f, "to-temporary-file"),
        }
    }
}

/// A single HTTP request to fetch.
///
/// # Examples
///
/// ```
/// use progress_fetch::FetchRequest;
///
/// let request = FetchRequest::get("https://picsum.photos/400")
///     .header("Accept", "image/*");
/// assert_eq!(request.method(), "GET");
/// assert_eq!(request.headers().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    url: String,
    method: String,
    headers: Arc<[(String, String)]>,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Arc::new([]),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Add a single header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn headers_from(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = Arc::from(headers);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Extension of the last URL path segment, ignoring query and fragment.
    pub fn path_extension(&self) -> Option<&str> {
        let without_query = self.url.split(['?', '#']).next().unwrap_or_default();
        let after_scheme = without_query
            .split_once("://")
            .map_or(without_query, |(_, rest)| rest);
        let (_, path) = after_scheme.split_once('/')?;
        let segment = path.rsplit('/').next()?;
        let (stem, ext) = segment.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext)
    }
}
