//! I/O operations and effectful computations for fetching.
//!
//! This module holds everything that spawns tasks, touches the network or
//! the filesystem, or shares mutable state between fetches.

mod aggregate;
mod batch;
mod fetcher;
mod http;
mod relocate;

pub use aggregate::{FractionStream, ProgressGroup, ProgressUnit};
pub use batch::{Batch, BatchFetcher, BatchHandle, BatchOptions};
pub use fetcher::{FetchStream, Fetcher};
pub use http::{Body, Completion, HttpClient, TransferCounters, TransientFile};
#[cfg(feature = "reqwest")]
pub use http::{ReqwestClient, ReqwestClientError};
