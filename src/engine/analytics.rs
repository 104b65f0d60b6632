//! Post-run analytics over the complete record store.
//!
//! Everything here is deterministic and idempotent: running [`analyze`]
//! twice over the same records yields the same `rps` values and summary.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use super::record::{RequestStatus, ResultRecord};

/// Trailing window used for per-record throughput.
pub const RPS_WINDOW: Duration = Duration::from_secs(1);

/// Reported percentiles, in basis points of the sample count.
pub const PERCENTILES: [(u8, u64); 5] = [
    (50, 5_000),
    (90, 9_000),
    (95, 9_500),
    (99, 9_900),
    (100, 10_000),
];

const BASIS_POINTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentileRow {
    pub percentile: u8,
    pub latency: Duration,
}

/// Latency percentiles for one record class. Empty when the class had no
/// samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PercentileTable {
    pub rows: Vec<PercentileRow>,
}

impl PercentileTable {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn get(&self, percentile: u8) -> Option<Duration> {
        self.rows
            .iter()
            .find(|row| row.percentile == percentile)
            .map(|row| row.latency)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: u64,
    pub ok: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub elapsed: Duration,
    pub mean_ok_latency: Duration,
    pub max_latency: Duration,
    /// Whole-run throughput, fixed-point with two decimals.
    pub avg_rps_x100: u64,
    pub peak_rps: u64,
    pub ok_percentiles: PercentileTable,
    pub error_percentiles: PercentileTable,
    pub status_counts: BTreeMap<u16, u64>,
    pub first_error: Option<String>,
}

impl Summary {
    /// Error share in basis points.
    #[must_use]
    pub fn error_ratio_bp(&self) -> u64 {
        self.errors
            .saturating_mul(BASIS_POINTS)
            .checked_div(self.total)
            .unwrap_or(0)
    }
}

/// Sorts by receipt time, fills in `rps` and summarizes.
pub fn analyze(records: &mut [ResultRecord], elapsed: Duration) -> Summary {
    sort_by_receipt(records);
    let counts = window_rps(records);
    for (record, rps) in records.iter_mut().zip(counts) {
        record.rps = rps;
    }
    summarize(records, elapsed)
}

/// Stable sort, so records received at the same instant keep arrival order.
pub fn sort_by_receipt(records: &mut [ResultRecord]) {
    records.sort_by_key(|record| record.received_time);
}

/// For each record `i` of a receipt-sorted slice, counts the records `j <= i`
/// with `t_i - t_j < 1s`.
///
/// Walks backwards with a left pointer that only ever moves left, so the
/// whole pass is linear.
#[must_use]
pub fn window_rps(records: &[ResultRecord]) -> Vec<u64> {
    let times: Vec<Instant> = records.iter().map(|record| record.received_time).collect();
    let mut counts = vec![0_u64; times.len()];
    let mut lo = times.len();
    for (i, (t_i, slot)) in times.iter().zip(counts.iter_mut()).enumerate().rev() {
        lo = lo.min(i);
        while let Some(prev) = lo.checked_sub(1).and_then(|idx| times.get(idx)) {
            if t_i.saturating_duration_since(*prev) >= RPS_WINDOW {
                break;
            }
            lo = lo.saturating_sub(1);
        }
        let in_window = i.saturating_sub(lo).saturating_add(1);
        *slot = u64::try_from(in_window).unwrap_or(u64::MAX);
    }
    counts
}

/// Nearest-rank percentiles with round-half-up indexing over sorted samples.
#[must_use]
pub fn percentile_table(mut latencies: Vec<Duration>) -> PercentileTable {
    if latencies.is_empty() {
        return PercentileTable::default();
    }
    latencies.sort_unstable();
    let rows = PERCENTILES
        .iter()
        .filter_map(|&(percentile, basis_points)| {
            let idx = percentile_index(latencies.len(), basis_points);
            latencies.get(idx).map(|&latency| PercentileRow {
                percentile,
                latency,
            })
        })
        .collect();
    PercentileTable { rows }
}

fn percentile_index(count: usize, basis_points: u64) -> usize {
    let count_u64 = u64::try_from(count).unwrap_or(u64::MAX);
    let rounded = basis_points
        .saturating_mul(count_u64)
        .saturating_add(BASIS_POINTS / 2)
        .checked_div(BASIS_POINTS)
        .unwrap_or(0);
    usize::try_from(rounded)
        .unwrap_or(usize::MAX)
        .min(count.saturating_sub(1))
}

#[must_use]
pub fn summarize(records: &[ResultRecord], elapsed: Duration) -> Summary {
    let mut summary = Summary {
        elapsed,
        ..Summary::default()
    };
    let mut ok_latencies = Vec::new();
    let mut error_latencies = Vec::new();
    let mut ok_latency_total = Duration::ZERO;

    for record in records {
        let latency = record.response_time();
        summary.total = summary.total.saturating_add(1);
        summary.max_latency = summary.max_latency.max(latency);
        summary.peak_rps = summary.peak_rps.max(record.rps);
        let count = summary.status_counts.entry(record.status.code()).or_insert(0);
        *count = count.saturating_add(1);

        if record.is_ok() {
            summary.ok = summary.ok.saturating_add(1);
            ok_latency_total = ok_latency_total.saturating_add(latency);
            ok_latencies.push(latency);
            continue;
        }

        summary.errors = summary.errors.saturating_add(1);
        error_latencies.push(latency);
        match record.status {
            RequestStatus::Timeout => summary.timeouts = summary.timeouts.saturating_add(1),
            RequestStatus::Transport => {
                summary.transport_errors = summary.transport_errors.saturating_add(1);
            }
            RequestStatus::Http(_) => {}
        }
        if summary.first_error.is_none() {
            summary.first_error = record.error.clone();
        }
    }

    summary.mean_ok_latency = u32::try_from(summary.ok)
        .ok()
        .and_then(|ok| ok_latency_total.checked_div(ok))
        .unwrap_or(Duration::ZERO);
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    summary.avg_rps_x100 = summary
        .total
        .saturating_mul(100_000)
        .checked_div(elapsed_ms)
        .unwrap_or(0);
    summary.ok_percentiles = percentile_table(ok_latencies);
    summary.error_percentiles = percentile_table(error_latencies);
    summary
}
