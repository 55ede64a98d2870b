//! Progress-reporting HTTP fetches exposed as streams.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable requests, progress events and payloads
//! - [`core`] - Pure transformations (fractions, naming, state transitions)
//! - [`effects`] - The fetch driver, aggregate tracking and the HTTP seam
//!
//! # Key Features
//!
//! - **Cold Streams**: A [`FetchStream`] issues its request on first poll and
//!   cancels it when dropped
//! - **Safe Hand-off**: Downloaded files are moved out of the client's
//!   transient location into the configured cache root before delivery
//! - **Aggregate Progress**: [`BatchFetcher`] runs a batch with bounded
//!   concurrency and publishes one monotone completion fraction
//! - **Mechanism-Only**: No retries and no caching; callers own the payloads

pub mod config;
pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use config::FetchConfig;
pub use data::{
    DataResponse, DownloadResponse, FetchRequest, Payload, Progress, ProgressEvent, ResponseMeta,
    TransferMode,
};
pub use effects::{
    Batch, BatchFetcher, BatchHandle, BatchOptions, Body, Completion, FetchStream, Fetcher,
    FractionStream, HttpClient, ProgressGroup, ProgressUnit, TransferCounters, TransientFile,
};

#[cfg(feature = "reqwest")]
pub use effects::{ReqwestClient, ReqwestClientError};

pub use error::{BatchError, ConfigError, FetchError, Result};
