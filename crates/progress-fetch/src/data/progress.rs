use crate::data::payload::Payload;
use crate::error::FetchError;

/// A point-in-time sample of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes received so far.
    pub bytes_received: u64,

    /// Total expected bytes, if known.
    ///
    /// This is `None` until response headers arrive, and stays `None` when
    /// the server sends no Content-Length.
    pub bytes_expected: Option<u64>,
}

impl Progress {
    pub fn new(bytes_received: u64, bytes_expected: Option<u64>) -> Self {
        Self {
            bytes_received,
            bytes_expected,
        }
    }

    /// Fraction of the expected bytes received, clamped to `[0, 1]`.
    ///
    /// Returns `None` if the expected size is unknown. An expected size of
    /// zero reads as complete.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        self.bytes_expected
            .map(|expected| crate::core::fraction::byte_fraction(self.bytes_received, expected))
    }
}

/// One item of a fetch stream.
///
/// A stream yields zero or more `InProgress` events, then at most one
/// terminal event, which is always last.
#[derive(Debug)]
pub enum ProgressEvent {
    InProgress(Progress),
    Completed(Payload),
    Failed(FetchError),
}

impl ProgressEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::InProgress(_))
    }

    pub fn progress(&self) -> Option<Progress> {
        match self {
            ProgressEvent::InProgress(progress) => Some(*progress),
            _ => None,
        }
    }
}
