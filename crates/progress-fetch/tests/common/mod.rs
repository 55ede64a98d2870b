//! Shared test support: a scripted HTTP client with a call spy.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use progress_fetch::{
    Completion, FetchConfig, FetchRequest, HttpClient, ProgressEvent, ResponseMeta,
    TransferCounters, TransferMode,
};

/// One step a scripted transfer performs before finishing.
#[derive(Debug, Clone)]
pub enum Step {
    Expect(Option<u64>),
    Receive(u64),
    Pause(Duration),
}

/// How a scripted transfer ends.
#[derive(Debug, Clone)]
pub enum Finish {
    /// Deliver the body as bytes or as a transient file, following the mode.
    Body(Vec<u8>),
    Fail(String),
    NoResponse,
    NoBody,
    /// Never finish; only cancellation ends the transfer.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub steps: Vec<Step>,
    pub finish: Finish,
}

impl Script {
    /// Deliver `content` in four chunks with a short pause before each.
    pub fn body(content: impl Into<Vec<u8>>) -> Self {
        Self::body_paced(content, Duration::from_millis(3))
    }

    pub fn body_paced(content: impl Into<Vec<u8>>, pause: Duration) -> Self {
        let content = content.into();
        let len = content.len() as u64;
        let chunk = (len / 4).max(1);
        let mut steps = vec![Step::Expect(Some(len))];
        let mut sent = 0;
        while sent < len {
            let next = chunk.min(len - sent);
            steps.push(Step::Pause(pause));
            steps.push(Step::Receive(next));
            sent += next;
        }
        Self {
            steps,
            finish: Finish::Body(content),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            steps: vec![
                Step::Expect(Some(100)),
                Step::Pause(Duration::from_millis(3)),
                Step::Receive(40),
                Step::Pause(Duration::from_millis(3)),
            ],
            finish: Finish::Fail(message.to_string()),
        }
    }

    pub fn hang() -> Self {
        Self {
            steps: vec![Step::Expect(Some(100)), Step::Receive(10)],
            finish: Finish::Hang,
        }
    }

    pub fn ending(finish: Finish) -> Self {
        Self {
            steps: vec![Step::Pause(Duration::from_millis(2))],
            finish,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub String);

/// Records what the client was asked to do.
#[derive(Debug, Default)]
pub struct Spy {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub finished: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub started: Mutex<Vec<String>>,
}

impl Spy {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

/// Counts the transfer as cancelled if dropped before `finish`.
struct CallGuard {
    spy: Arc<Spy>,
    finished: bool,
}

impl CallGuard {
    fn enter(spy: &Arc<Spy>, url: &str) -> Self {
        spy.calls.fetch_add(1, Ordering::SeqCst);
        spy.started.lock().unwrap().push(url.to_string());
        let active = spy.active.fetch_add(1, Ordering::SeqCst) + 1;
        spy.peak_active.fetch_max(active, Ordering::SeqCst);
        Self {
            spy: Arc::clone(spy),
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
        self.spy.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.spy.active.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.spy.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct ScriptedClient {
    scripts: HashMap<String, Script>,
    staging: PathBuf,
    pub spy: Arc<Spy>,
}

impl ScriptedClient {
    pub fn new(staging: impl Into<PathBuf>) -> Self {
        Self {
            scripts: HashMap::new(),
            staging: staging.into(),
            spy: Arc::new(Spy::default()),
        }
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }
}

impl HttpClient for ScriptedClient {
    type Error = ScriptError;

    async fn execute(
        &self,
        request: &FetchRequest,
        mode: TransferMode,
        counters: Arc<TransferCounters>,
    ) -> Result<Completion, ScriptError> {
        let guard = CallGuard::enter(&self.spy, request.url());
        let script = self
            .scripts
            .get(request.url())
            .cloned()
            .ok_or_else(|| ScriptError(format!("no script for {}", request.url())))?;

        for step in script.steps {
            match step {
                Step::Expect(expected) => counters.set_expected(expected),
                Step::Receive(len) => counters.add_received(len),
                Step::Pause(duration) => tokio::time::sleep(duration).await,
            }
        }

        let meta = ResponseMeta::new(request.url(), 200);
        let outcome = match script.finish {
            Finish::Body(content) => match mode {
                TransferMode::Buffered => Ok(Completion::data(meta, content)),
                TransferMode::ToTemporaryFile => {
                    let suffix = request
                        .path_extension()
                        .map(|ext| format!(".{ext}"))
                        .unwrap_or_default();
                    let file = tempfile::Builder::new()
                        .suffix(&suffix)
                        .tempfile_in(&self.staging)
                        .map_err(|e| ScriptError(e.to_string()))?;
                    std::fs::write(file.path(), &content).map_err(|e| ScriptError(e.to_string()))?;
                    Ok(Completion::file(meta, file))
                }
            },
            Finish::Fail(message) => Err(ScriptError(message)),
            Finish::NoResponse => Ok(Completion::default()),
            Finish::NoBody => Ok(Completion {
                response: Some(meta),
                body: None,
            }),
            Finish::Hang => std::future::pending().await,
        };

        guard.finish();
        outcome
    }
}

pub struct Fixture {
    pub staging: tempfile::TempDir,
    pub cache: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            staging: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> FetchConfig {
        FetchConfig::default()
            .cache_dir(self.cache.path())
            .staging_dir(self.staging.path())
            .progress_interval_ms(1)
    }

    pub fn client(&self) -> ScriptedClient {
        ScriptedClient::new(self.staging.path())
    }
}

pub fn url(name: &str) -> String {
    format!("http://test.local/{name}")
}

pub async fn collect_events(stream: impl Stream<Item = ProgressEvent> + Unpin) -> Vec<ProgressEvent> {
    stream.collect().await
}

/// Progress samples are non-decreasing and exactly one terminal event comes last.
pub fn assert_well_formed(events: &[ProgressEvent]) {
    let (last, rest) = events.split_last().expect("no events");
    assert!(last.is_terminal(), "last event is not terminal: {last:?}");
    let mut received = 0;
    for event in rest {
        let progress = event
            .progress()
            .unwrap_or_else(|| panic!("terminal event before the end: {event:?}"));
        assert!(progress.bytes_received >= received);
        received = progress.bytes_received;
    }
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
