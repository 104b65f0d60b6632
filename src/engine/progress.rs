use std::time::Duration;

use tokio::sync::watch;

use super::record::ResultRecord;

/// Snapshot published by the orchestrator once per progress tick.
///
/// `rps`, `error_ratio_bp` and `mean_latency` describe only the records
/// received during the last tick; `requests` is cumulative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub requests: u64,
    pub percent_done: u64,
    pub rps: u64,
    /// Error share of the last tick in basis points (1/100 of a percent).
    pub error_ratio_bp: u64,
    /// Mean latency of the successful records of the last tick.
    pub mean_latency: Duration,
    pub elapsed: Duration,
}

/// Read side of the progress channel.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    rx: watch::Receiver<Progress>,
}

impl ProgressHandle {
    pub(crate) const fn new(rx: watch::Receiver<Progress>) -> Self {
        Self { rx }
    }

    #[must_use]
    pub fn current(&self) -> Progress {
        *self.rx.borrow()
    }

    /// Waits for the next snapshot. Returns `None` once the run has finished
    /// and the orchestrator dropped its sender.
    pub async fn changed(&mut self) -> Option<Progress> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Per-tick accumulator; reset after every snapshot.
#[derive(Debug, Default)]
pub(crate) struct TickStats {
    requests: u64,
    errors: u64,
    ok: u64,
    ok_latency: Duration,
}

impl TickStats {
    pub(crate) fn observe(&mut self, record: &ResultRecord) {
        self.requests = self.requests.saturating_add(1);
        if record.is_ok() {
            self.ok = self.ok.saturating_add(1);
            self.ok_latency = self.ok_latency.saturating_add(record.response_time());
        } else {
            self.errors = self.errors.saturating_add(1);
        }
    }

    /// Builds a snapshot scaled to `tick` and clears the accumulator.
    pub(crate) fn snapshot(
        &mut self,
        cumulative: u64,
        percent_done: u64,
        elapsed: Duration,
        tick: Duration,
    ) -> Progress {
        let stats = std::mem::take(self);
        let tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX).max(1);
        let rps = stats
            .requests
            .saturating_mul(1_000)
            .checked_div(tick_ms)
            .unwrap_or(0);
        let error_ratio_bp = stats
            .errors
            .saturating_mul(10_000)
            .checked_div(stats.requests)
            .unwrap_or(0);
        let mean_latency = u32::try_from(stats.ok)
            .ok()
            .and_then(|ok| stats.ok_latency.checked_div(ok))
            .unwrap_or(Duration::ZERO);
        Progress {
            requests: cumulative,
            percent_done: percent_done.min(100),
            rps,
            error_ratio_bp,
            mean_latency,
            elapsed,
        }
    }
}
