use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Response metadata delivered alongside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
        }
    }

    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response body held in memory.
#[derive(Debug, Clone)]
pub struct DataResponse {
    pub body: Bytes,
    pub response: ResponseMeta,
}

/// A response body stored in a file under the cache root.
///
/// The file belongs to the receiver, who is responsible for deleting it.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub path: PathBuf,
    pub response: ResponseMeta,
}

/// Successful outcome of a fetch.
#[derive(Debug, Clone)]
pub enum Payload {
    Data(DataResponse),
    Download(DownloadResponse),
}

impl Payload {
    pub fn response(&self) -> &ResponseMeta {
        match self {
            Payload::Data(data) => &data.response,
            Payload::Download(download) => &download.response,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Data(data) => Some(&data.body),
            Payload::Download(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Payload::Data(_) => None,
            Payload::Download(download) => Some(&download.path),
        }
    }
}
