use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, debug_span, warn};

use crate::config::FetchConfig;
use crate::core::{FetchPhase, unit_fraction};
use crate::data::{
    DataResponse, DownloadResponse, FetchRequest, Payload, Progress, ProgressEvent, TransferMode,
};
use crate::effects::aggregate::ProgressUnit;
use crate::effects::http::{Body, Completion, HttpClient, TransferCounters};
use crate::effects::relocate::relocate;
use crate::error::{FetchError, Result};

/// Issues fetches against an [`HttpClient`].
pub struct Fetcher<C: HttpClient> {
    client: Arc<C>,
    config: Arc<FetchConfig>,
}

impl<C: HttpClient> Clone for Fetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C: HttpClient> Fetcher<C> {
    /// Create a new fetcher with the provided HTTP client and configuration.
    pub fn new(client: C, config: FetchConfig) -> Self {
        Self {
            client: Arc::new(client),
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Prepare a fetch. Nothing is sent until the returned stream is first polled.
    pub fn fetch(&self, request: FetchRequest, mode: TransferMode) -> FetchStream {
        self.prepare(request, mode, None)
    }

    /// Prepare a fetch that reports into an aggregate progress unit.
    ///
    /// The unit is completed at the terminal event, on success and failure alike.
    pub fn fetch_with_unit(
        &self,
        request: FetchRequest,
        mode: TransferMode,
        unit: ProgressUnit,
    ) -> FetchStream {
        self.prepare(request, mode, Some(unit))
    }

    fn prepare(
        &self,
        request: FetchRequest,
        mode: TransferMode,
        unit: Option<ProgressUnit>,
    ) -> FetchStream {
        let client = Arc::clone(&self.client);
        let config = Arc::clone(&self.config);
        let capacity = config.effective_channel_capacity();
        let start: Starter = Box::new(move |tx| {
            let span = debug_span!("fetch", url = %request.url(), %mode);
            tokio::spawn(drive(client, config, request, mode, unit, tx).instrument(span))
        });
        FetchStream {
            phase: FetchPhase::NotStarted,
            start: Some(start),
            capacity,
            rx: None,
            task: None,
        }
    }
}

type Starter = Box<dyn FnOnce(mpsc::Sender<ProgressEvent>) -> JoinHandle<()> + Send>;

/// A single-shot stream of [`ProgressEvent`]s for one request.
///
/// The request is issued when the stream is first polled. Dropping the
/// stream, or calling [`cancel`](Self::cancel), before the terminal event
/// cancels the underlying transfer; no event is yielded afterwards.
pub struct FetchStream {
    phase: FetchPhase,
    start: Option<Starter>,
    capacity: usize,
    rx: Option<mpsc::Receiver<ProgressEvent>>,
    task: Option<JoinHandle<()>>,
}

impl FetchStream {
    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    /// Cancel the fetch. Has no effect once a terminal event was yielded.
    pub fn cancel(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if self.phase == FetchPhase::InFlight {
            debug!("fetch cancelled");
        }
        self.phase = self.phase.cancel();
        self.start = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            // A completion may already be buffered; its file was never delivered.
            while let Ok(event) = rx.try_recv() {
                if let ProgressEvent::Completed(payload) = event {
                    drop(Undelivered(payload.path().map(Path::to_path_buf)));
                }
            }
        }
    }

    /// Drive the fetch to its terminal event and return the outcome.
    pub async fn payload(mut self) -> Result<Payload> {
        while let Some(event) = self.next().await {
            match event {
                ProgressEvent::InProgress(_) => continue,
                ProgressEvent::Completed(payload) => return Ok(payload),
                ProgressEvent::Failed(err) => return Err(err),
            }
        }
        Err(driver_stopped())
    }

    fn begin(&mut self) {
        if let Some(start) = self.start.take() {
            let (tx, rx) = mpsc::channel(self.capacity);
            self.task = Some(start(tx));
            self.rx = Some(rx);
            self.phase = self.phase.start();
        }
    }

    fn settle(&mut self, succeeded: bool) {
        self.phase = self.phase.finish(succeeded);
        self.rx = None;
        // The driver exits on its own after sending the terminal event.
        self.task = None;
    }
}

impl Stream for FetchStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        let this = self.get_mut();
        if this.phase == FetchPhase::NotStarted {
            this.begin();
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(rx.poll_recv(cx)) {
            Some(event) => {
                if event.is_terminal() {
                    this.settle(matches!(event, ProgressEvent::Completed(_)));
                }
                Poll::Ready(Some(event))
            }
            None => {
                // Channel closed without a terminal event: the driver panicked.
                this.settle(false);
                Poll::Ready(Some(ProgressEvent::Failed(driver_stopped())))
            }
        }
    }
}

impl Drop for FetchStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn driver_stopped() -> FetchError {
    FetchError::Transport(Box::new(io::Error::other("fetch driver stopped unexpectedly")))
}

/// Turns counter samples into progress events and unit reports.
struct Sampler {
    last: Option<Progress>,
    sent: Option<Progress>,
    unit: Option<ProgressUnit>,
}

impl Sampler {
    /// New sample if it differs from the last one taken.
    fn sample(&mut self, counters: &TransferCounters) -> Option<Progress> {
        let mut progress = counters.snapshot();
        if let Some(last) = self.last {
            progress.bytes_received = progress.bytes_received.max(last.bytes_received);
            if progress == last {
                return None;
            }
        }
        self.last = Some(progress);
        if let Some(unit) = &self.unit {
            unit.report(unit_fraction(&progress));
        }
        Some(progress)
    }

    /// Latest sample not yet delivered to the stream.
    fn unsent(&self) -> Option<Progress> {
        self.last.filter(|last| self.sent != Some(*last))
    }

    fn mark_sent(&mut self, progress: Progress) {
        self.sent = Some(progress);
    }

    fn complete(&self) {
        if let Some(unit) = &self.unit {
            unit.complete();
        }
    }
}

/// Removes a relocated file unless it reached the consumer.
struct Undelivered(Option<PathBuf>);

impl Undelivered {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for Undelivered {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            debug!(path = %path.display(), "removing undelivered download");
            if let Err(error) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), %error, "failed to remove undelivered download");
            }
        }
    }
}

async fn drive<C: HttpClient>(
    client: Arc<C>,
    config: Arc<FetchConfig>,
    request: FetchRequest,
    mode: TransferMode,
    unit: Option<ProgressUnit>,
    tx: mpsc::Sender<ProgressEvent>,
) {
    debug!("fetch started");
    let counters = Arc::new(TransferCounters::new());
    let mut sampler = Sampler {
        last: None,
        sent: None,
        unit,
    };

    let transfer = client.execute(&request, mode, Arc::clone(&counters));
    tokio::pin!(transfer);

    let mut ticker = tokio::time::interval(config.progress_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut transfer => break outcome,
            _ = ticker.tick() => {
                sampler.sample(&counters);
                if let Some(progress) = sampler.unsent() {
                    // A full channel skips this tick; the sample stays pending.
                    match tx.try_send(ProgressEvent::InProgress(progress)) {
                        Ok(()) => sampler.mark_sent(progress),
                        Err(mpsc::error::TrySendError::Full(_)) => {}
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }
            }
        }
    };

    sampler.sample(&counters);
    if let Some(progress) = sampler.unsent() {
        if tx.send(ProgressEvent::InProgress(progress)).await.is_err() {
            return;
        }
        sampler.mark_sent(progress);
    }

    let settled = settle(outcome, mode, &config.cache_dir).await;
    sampler.complete();

    let mut undelivered = Undelivered(None);
    let event = match settled {
        Ok(payload) => {
            debug!(status = payload.response().status, "fetch completed");
            undelivered.0 = payload.path().map(Path::to_path_buf);
            ProgressEvent::Completed(payload)
        }
        Err(err) => {
            warn!(error = %err, "fetch failed");
            ProgressEvent::Failed(err)
        }
    };

    if tx.send(event).await.is_ok() {
        undelivered.disarm();
    }
}

async fn settle<E>(
    outcome: std::result::Result<Completion, E>,
    mode: TransferMode,
    cache_dir: &Path,
) -> Result<Payload>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let completion = outcome.map_err(FetchError::transport)?;
    let response = completion.response.ok_or(FetchError::InvalidResponse)?;

    match (mode, completion.body) {
        (TransferMode::Buffered, Some(Body::Bytes(body))) => {
            Ok(Payload::Data(DataResponse { body, response }))
        }
        (TransferMode::ToTemporaryFile, Some(Body::File(file))) => {
            let path = relocate(file, cache_dir).await?;
            Ok(Payload::Download(DownloadResponse { path, response }))
        }
        _ => Err(FetchError::MissingPayload),
    }
}
