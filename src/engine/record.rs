use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Synthetic status stored for attempts that hit the per-request deadline.
pub const TIMEOUT_STATUS_CODE: u16 = 598;
/// Synthetic status stored for connect/DNS/TLS/IO failures and worker faults.
pub const TRANSPORT_STATUS_CODE: u16 = 599;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Http(u16),
    Timeout,
    Transport,
}

impl RequestStatus {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Http(code) => code,
            Self::Timeout => TIMEOUT_STATUS_CODE,
            Self::Transport => TRANSPORT_STATUS_CODE,
        }
    }

    /// Any 2xx response counts as success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Http(200..=299))
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(code) => write!(f, "{code}"),
            Self::Timeout => write!(f, "{TIMEOUT_STATUS_CODE} (timeout)"),
            Self::Transport => write!(f, "{TRANSPORT_STATUS_CODE} (transport)"),
        }
    }
}

/// Outcome of exactly one dequeued template.
///
/// Workers fill in the timing and status; the orchestrator stamps receipt
/// time, timeline and phase; analytics writes `rps` after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub seq: u64,
    pub start_time: Instant,
    pub end_time: Instant,
    pub received_time: Instant,
    pub timeline: Duration,
    pub status: RequestStatus,
    pub error: Option<String>,
    pub rps: u64,
    pub phase: Option<Arc<str>>,
}

impl ResultRecord {
    #[must_use]
    pub const fn new(
        seq: u64,
        start_time: Instant,
        end_time: Instant,
        status: RequestStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            seq,
            start_time,
            end_time,
            received_time: end_time,
            timeline: Duration::ZERO,
            status,
            error,
            rps: 0,
            phase: None,
        }
    }

    #[must_use]
    pub fn response_time(&self) -> Duration {
        self.end_time.saturating_duration_since(self.start_time)
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub(crate) fn mark_received(
        &mut self,
        received_time: Instant,
        run_start: Instant,
        phase: Option<&Arc<str>>,
    ) {
        self.received_time = received_time;
        self.timeline = received_time.saturating_duration_since(run_start);
        self.phase = phase.cloned();
    }
}
