use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use progress_fetch::{
    Batch, BatchFetcher, BatchOptions, FetchConfig, FetchRequest, Fetcher, ProgressEvent,
    ReqwestClient, TransferMode,
};

use crate::tracker::{ByteTracker, FractionTracker};

#[derive(Debug, Parser)]
#[command(name = "progress-fetch", version, about = "Fetch URLs with live progress")]
pub struct Cli {
    /// Load fetch settings from a TOML file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log fetch activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Single(Single),
    Grid(Grid),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => FetchConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => FetchConfig::default(),
        };
        let client = ReqwestClient::from_config(&config).context("failed to build HTTP client")?;
        let fetcher = Fetcher::new(client, config);

        match self.command {
            Command::Single(single) => single.run(fetcher).await,
            Command::Grid(grid) => grid.run(fetcher).await,
        }
    }
}

/// Download one URL to a file and print where it landed.
#[derive(Debug, clap::Args)]
pub struct Single {
    url: String,
}

impl Single {
    async fn run(self, fetcher: Fetcher<ReqwestClient>) -> Result<()> {
        let tracker = ByteTracker::new("Fetching");
        let mut stream = fetcher.fetch(FetchRequest::get(&self.url), TransferMode::ToTemporaryFile);

        while let Some(event) = stream.next().await {
            match event {
                ProgressEvent::InProgress(progress) => tracker.update(progress),
                ProgressEvent::Completed(payload) => {
                    tracker.finish("done");
                    let path = payload.path().context("download produced no file")?;
                    println!("{}", path.display());
                    return Ok(());
                }
                ProgressEvent::Failed(err) => {
                    tracker.abandon("failed");
                    return Err(err).with_context(|| format!("failed to fetch {}", self.url));
                }
            }
        }

        bail!("fetch of {} ended without a result", self.url)
    }
}

/// Fetch one URL many times as a batch under a single aggregate bar.
#[derive(Debug, clap::Args)]
pub struct Grid {
    url: String,

    /// Number of fetches in the batch
    #[arg(long, default_value_t = 30)]
    count: usize,

    /// Maximum fetches in flight at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Let the remaining fetches finish after a failure
    #[arg(long)]
    keep_going: bool,
}

impl Grid {
    async fn run(self, fetcher: Fetcher<ReqwestClient>) -> Result<()> {
        let options = BatchOptions::from_config(fetcher.config())
            .max_concurrent(self.concurrency)
            .fail_fast(!self.keep_going);
        let requests = vec![FetchRequest::get(&self.url); self.count];

        let tracker = FractionTracker::new("Batch");
        let Batch {
            mut progress,
            result,
        } = BatchFetcher::new(fetcher).fetch_all(requests, TransferMode::Buffered, options);

        let watch = async {
            while let Some(fraction) = progress.next().await {
                tracker.update(fraction);
            }
        };
        let ((), outcome) = tokio::join!(watch, result);

        match outcome {
            Ok(payloads) => {
                tracker.finish("done");
                for (index, payload) in payloads.iter().enumerate() {
                    let size = payload.bytes().map_or(0, |body| body.len());
                    println!("#{index:02} {} {size} bytes", payload.response().status);
                }
                Ok(())
            }
            Err(err) => {
                tracker.abandon("failed");
                Err(err).context("batch failed")
            }
        }
    }
}
