use std::fmt::Write;

use crate::engine::{PercentileTable, RunReport, StopCondition};

use super::{format_ms, format_secs};

pub fn print_summary(report: &RunReport) {
    print!("{}", render_summary(report));
}

#[must_use]
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _written = write_summary(&mut out, report).is_ok();
    out
}

fn write_summary(out: &mut String, report: &RunReport) -> std::fmt::Result {
    let settings = &report.settings;
    let summary = &report.summary;

    if let Some(phase) = settings.phase.as_deref() {
        writeln!(out, "Phase: {}", phase)?;
    }
    row(out, "Target URL:", settings.target.as_str())?;
    match settings.stop {
        StopCondition::MaxRequests(limit) => row(out, "Max requests:", &limit.get().to_string())?,
        StopCondition::Duration(duration) => row(out, "Duration:", &format_secs(duration))?,
    }
    row(out, "Concurrency level:", &settings.vu.get().to_string())?;
    if let Some(rate) = settings.constant_rps {
        row(out, "Constant rate:", &format!("{} req/s", rate.get()))?;
    }
    writeln!(out)?;

    row(out, "Completed requests:", &summary.total.to_string())?;
    row(out, "Total errors:", &summary.errors.to_string())?;
    if summary.timeouts > 0 {
        row(out, "  Timeouts:", &summary.timeouts.to_string())?;
    }
    if summary.transport_errors > 0 {
        row(out, "  Transport errors:", &summary.transport_errors.to_string())?;
    }
    row(out, "Total time:", &format_secs(report.elapsed))?;
    row(
        out,
        "Requests per second:",
        &format!(
            "{}.{:02}",
            summary.avg_rps_x100.checked_div(100).unwrap_or(0),
            summary.avg_rps_x100.checked_rem(100).unwrap_or(0)
        ),
    )?;
    row(out, "Peak requests per second:", &summary.peak_rps.to_string())?;
    row(out, "Mean latency:", &format_ms(summary.mean_ok_latency))?;
    writeln!(out)?;

    if !summary.status_counts.is_empty() {
        writeln!(out, "Status codes")?;
        for (code, count) in &summary.status_counts {
            row(out, &format!("  {}", code), &count.to_string())?;
        }
        writeln!(out)?;
    }
    if let Some(error) = summary.first_error.as_deref() {
        writeln!(out, "First error: {}", error)?;
        writeln!(out)?;
    }

    writeln!(out, "Percentage of the OK requests served within a certain time")?;
    percentile_rows(out, &summary.ok_percentiles, "No requests went fine!")?;
    writeln!(out, "Percentage of the ERROR requests served within a certain time")?;
    percentile_rows(out, &summary.error_percentiles, "No Errors")?;
    Ok(())
}

fn row(out: &mut String, label: &str, value: &str) -> std::fmt::Result {
    writeln!(out, "{:<30}{:>20}", label, value)
}

fn percentile_rows(out: &mut String, table: &PercentileTable, empty: &str) -> std::fmt::Result {
    if table.is_empty() {
        return writeln!(out, "{}", empty);
    }
    for entry in &table.rows {
        row(out, &format!("{}%", entry.percentile), &format_ms(entry.latency))?;
    }
    Ok(())
}
