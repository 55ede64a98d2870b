use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use progress_fetch::Progress;

const BYTES_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

const PERCENT_STYLE: &str =
    "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

/// Resolution of the aggregate bar.
const FRACTION_STEPS: u64 = 1000;

fn styled(template: &str) -> Option<ProgressStyle> {
    let pb_style = ProgressStyle::with_template(template).ok()?;
    Some(pb_style.tick_chars(TICK).progress_chars(PB_CHARS))
}

static BYTES_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| styled(BYTES_STYLE));

static PERCENT_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| styled(PERCENT_STYLE));

fn build(pb: ProgressBar, style: Option<&ProgressStyle>, prefix: &str) -> ProgressBar {
    let pb = match style {
        Some(style) => pb.with_style(style.clone()),
        None => pb,
    };
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Byte-level bar for a single fetch.
pub struct ByteTracker {
    pb: ProgressBar,
}

impl ByteTracker {
    pub fn new(prefix: &str) -> Self {
        Self {
            pb: build(ProgressBar::no_length(), BYTES_TEMPLATE.as_ref(), prefix),
        }
    }

    pub fn update(&self, progress: Progress) {
        if let Some(total) = progress.bytes_expected {
            self.pb.set_length(total);
        }
        self.pb.set_position(progress.bytes_received);
    }

    pub fn finish(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self, msg: &str) {
        self.pb.abandon_with_message(msg.to_string());
    }
}

/// Percentage bar for a combined completion fraction.
pub struct FractionTracker {
    pb: ProgressBar,
}

impl FractionTracker {
    pub fn new(prefix: &str) -> Self {
        Self {
            pb: build(ProgressBar::new(FRACTION_STEPS), PERCENT_TEMPLATE.as_ref(), prefix),
        }
    }

    pub fn update(&self, fraction: f64) {
        let position = (fraction.clamp(0.0, 1.0) * FRACTION_STEPS as f64).round() as u64;
        self.pb.set_position(position);
    }

    pub fn finish(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self, msg: &str) {
        self.pb.abandon_with_message(msg.to_string());
    }
}
