//! Immutable data types for fetch operations.
//!
//! Requests are built once and shared; progress events and payloads are
//! produced by the fetch driver and handed to exactly one consumer.

pub mod payload;
pub mod progress;
pub mod request;

pub use payload::{DataResponse, DownloadResponse, Payload, ResponseMeta};
pub use progress::{Progress, ProgressEvent};
pub use request::{FetchRequest, TransferMode};
