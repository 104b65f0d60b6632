//! Run reports: console summary, record exports and the HTML page.
mod console;
mod export;
mod html;


pub use console::{print_summary, render_summary};
pub use export::{export_csv, export_json};
pub use html::write_html_report;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::engine::{ResultRecord, RunReport};

/// `12.34 ms`
pub(crate) fn format_ms(duration: Duration) -> String {
    let micros = duration.as_micros();
    let whole = micros.checked_div(1_000).unwrap_or(0);
    let hundredths = micros
        .checked_rem(1_000)
        .and_then(|rest| rest.checked_div(10))
        .unwrap_or(0);
    format!("{}.{:02} ms", whole, hundredths)
}

/// `1.23 s`
pub(crate) fn format_secs(duration: Duration) -> String {
    let millis = duration.as_millis();
    let whole = millis.checked_div(1_000).unwrap_or(0);
    let hundredths = millis
        .checked_rem(1_000)
        .and_then(|rest| rest.checked_div(10))
        .unwrap_or(0);
    format!("{}.{:02} s", whole, hundredths)
}

/// Start of each phase on one continuous timeline. A phase never starts
/// before the previous one ended, and later phases keep their real gap.
pub(crate) fn phase_offsets(reports: &[RunReport]) -> Vec<Duration> {
    let Some(origin) = reports.first().map(|report| report.run_start) else {
        return Vec::new();
    };
    let mut offsets = Vec::with_capacity(reports.len());
    let mut previous_end = Duration::ZERO;
    for report in reports {
        let offset = report
            .run_start
            .saturating_duration_since(origin)
            .max(previous_end);
        previous_end = offset.saturating_add(report.elapsed);
        offsets.push(offset);
    }
    offsets
}

/// Wall-clock send time of a record.
pub(crate) fn wall_clock_start(report: &RunReport, record: &ResultRecord) -> DateTime<Utc> {
    let offset = record.start_time.saturating_duration_since(report.run_start);
    TimeDelta::from_std(offset)
        .ok()
        .and_then(|delta| report.started_at.checked_add_signed(delta))
        .unwrap_or(report.started_at)
}

pub(crate) fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
