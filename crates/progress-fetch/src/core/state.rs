use std::fmt;

/// Lifecycle of a single fetch.
///
/// ```text
/// NotStarted -> InFlight -> Succeeded | Failed | Cancelled
/// ```
///
/// A fetch may also be cancelled before it starts. Terminal phases never
/// change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPhase {
    #[default]
    NotStarted,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

impl FetchPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FetchPhase::Succeeded | FetchPhase::Failed | FetchPhase::Cancelled
        )
    }

    /// Phase after the request has been issued.
    #[must_use]
    pub fn start(self) -> Self {
        match self {
            FetchPhase::NotStarted => FetchPhase::InFlight,
            other => other,
        }
    }

    /// Phase after a terminal outcome was observed.
    #[must_use]
    pub fn finish(self, succeeded: bool) -> Self {
        match self {
            FetchPhase::InFlight if succeeded => FetchPhase::Succeeded,
            FetchPhase::InFlight => FetchPhase::Failed,
            other => other,
        }
    }

    /// Phase after the consumer cancelled.
    #[must_use]
    pub fn cancel(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            FetchPhase::Cancelled
        }
    }
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::NotStarted => write!(f, "NotStarted"),
            FetchPhase::InFlight => write!(f, "InFlight"),
            FetchPhase::Succeeded => write!(f, "Succeeded"),
            FetchPhase::Failed => write!(f, "Failed"),
            FetchPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}
