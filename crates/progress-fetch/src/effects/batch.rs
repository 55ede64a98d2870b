//! Batch fetching with aggregate progress.
//!
//! A batch runs its requests through a pool of at most `max_concurrent`
//! active fetches, fed in input order from a queue of pending requests.
//! Results are reassembled in input order, independent of completion order.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, warn};

use crate::config::FetchConfig;
use crate::data::{FetchRequest, Payload, TransferMode};
use crate::effects::aggregate::{FractionStream, ProgressGroup};
use crate::effects::fetcher::Fetcher;
use crate::effects::http::HttpClient;
use crate::effects::relocate::discard;
use crate::error::BatchError;

/// Configuration for batch fetches.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of fetches active at once. Zero is treated as one.
    pub max_concurrent: usize,

    /// What happens to the rest of the batch after the first failure.
    ///
    /// - `true`: queued requests are dropped and in-flight fetches are
    ///   cancelled; the progress fraction stops where it was.
    /// - `false`: every remaining fetch runs to its end so the fraction
    ///   reaches 1.0; files they produce are removed, as nobody receives them.
    ///
    /// The batch result resolves with the first failure either way.
    pub fail_fast: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            fail_fast: true,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// A running batch.
pub struct Batch {
    /// Combined completion fraction; ends when the batch stops.
    pub progress: FractionStream,

    /// Index-aligned payloads, or the first failure.
    pub result: BatchHandle,
}

/// Future resolving to the outcome of a batch.
///
/// Dropping the handle before it resolves cancels the batch, including every
/// fetch still in flight.
pub struct BatchHandle {
    rx: oneshot::Receiver<Result<Vec<Payload>, BatchError>>,
    task: Option<JoinHandle<()>>,
    resolved: bool,
}

impl BatchHandle {
    /// Cancel the batch unless it already resolved.
    pub fn cancel(&mut self) {
        if self.resolved {
            return;
        }
        if let Some(task) = self.task.take() {
            debug!("batch cancelled");
            task.abort();
        }
        self.rx.close();
        if let Ok(Ok(payloads)) = self.rx.try_recv() {
            for path in payloads.iter().filter_map(Payload::path) {
                if let Err(error) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), %error, "failed to remove undelivered download");
                }
            }
        }
    }
}

impl Future for BatchHandle {
    type Output = Result<Vec<Payload>, BatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = ready!(Pin::new(&mut this.rx).poll(cx));
        this.resolved = true;
        Poll::Ready(outcome.unwrap_or_else(|_| {
            Err(BatchError::Aborted(
                "batch stopped without a result".to_string(),
            ))
        }))
    }
}

impl Drop for BatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs batches of fetches with bounded concurrency.
pub struct BatchFetcher<C: HttpClient> {
    fetcher: Arc<Fetcher<C>>,
}

impl<C: HttpClient> Clone for BatchFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<C: HttpClient> BatchFetcher<C> {
    /// Create a new batch fetcher.
    pub fn new(fetcher: Fetcher<C>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    /// Start fetching `requests`, each as one equally weighted progress unit.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn fetch_all(
        &self,
        requests: Vec<FetchRequest>,
        mode: TransferMode,
        options: BatchOptions,
    ) -> Batch {
        let group = ProgressGroup::new(requests.len());
        let progress = group.subscribe();
        let (tx, rx) = oneshot::channel();

        let span = debug_span!("batch", total = requests.len(), %mode);
        let task = tokio::spawn(
            coordinate(Arc::clone(&self.fetcher), group, requests, mode, options, tx)
                .instrument(span),
        );

        Batch {
            progress,
            result: BatchHandle {
                rx,
                task: Some(task),
                resolved: false,
            },
        }
    }
}

async fn coordinate<C: HttpClient>(
    fetcher: Arc<Fetcher<C>>,
    group: ProgressGroup,
    requests: Vec<FetchRequest>,
    mode: TransferMode,
    options: BatchOptions,
    tx: oneshot::Sender<Result<Vec<Payload>, BatchError>>,
) {
    let limit = options.max_concurrent.max(1);
    let mut slots: Vec<Option<Payload>> = vec![None; requests.len()];
    let mut pending: VecDeque<(usize, FetchRequest)> = requests.into_iter().enumerate().collect();
    let mut active = FuturesUnordered::new();
    let mut reply = Some(tx);

    loop {
        while active.len() < limit {
            let Some((index, request)) = pending.pop_front() else {
                break;
            };
            let Some(unit) = group.unit(index) else {
                continue;
            };
            debug!(index, url = %request.url(), "starting fetch");
            let stream = fetcher.fetch_with_unit(request, mode, unit);
            active.push(async move { (index, stream.payload().await) });
        }

        let Some((index, outcome)) = active.next().await else {
            break;
        };

        match outcome {
            Ok(payload) if reply.is_some() => slots[index] = Some(payload),
            Ok(payload) => {
                if let Some(path) = payload.path() {
                    discard(path).await;
                }
            }
            Err(source) => {
                let Some(tx) = reply.take() else {
                    debug!(index, error = %source, "later failure ignored");
                    continue;
                };
                warn!(index, error = %source, "batch fetch failed");
                let _ = tx.send(Err(BatchError::Failed { index, source }));
                discard_all(&mut slots).await;

                if options.fail_fast {
                    debug!(
                        cancelled = active.len(),
                        skipped = pending.len(),
                        "stopping batch after failure"
                    );
                    return;
                }
            }
        }
    }

    let Some(tx) = reply else {
        return;
    };
    debug!(completed = group.completed_units(), "batch completed");
    let payloads = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| BatchError::Aborted("batch ended with missing results".to_string()));
    if let Err(Ok(payloads)) = tx.send(payloads) {
        // Nobody is waiting: the handle was dropped after the last fetch ended.
        for payload in &payloads {
            if let Some(path) = payload.path() {
                discard(path).await;
            }
        }
    }
}

async fn discard_all(slots: &mut [Option<Payload>]) {
    for payload in slots.iter_mut().filter_map(Option::take) {
        if let Some(path) = payload.path() {
            discard(path).await;
        }
    }
}
