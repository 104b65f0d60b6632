use std::path::Path;

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::engine::{RunReport, Summary};
use crate::error::ReportError;

use super::{duration_micros, duration_millis, phase_offsets, wall_clock_start};

const CSV_HEADER: &[u8] = b"timeline_ms,started_at,latency_us,status,rps,phase,error\n";

/// One row per record, all phases in run order.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub async fn export_csv(path: &str, reports: &[RunReport]) -> Result<(), ReportError> {
    let write_err = |source| ReportError::Write {
        path: Path::new(path).to_path_buf(),
        source,
    };
    let file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(CSV_HEADER).await.map_err(write_err)?;
    for (report, offset) in reports.iter().zip(phase_offsets(reports)) {
        for record in &report.records {
            let line = format!(
                "{},{},{},{},{},{},{}\n",
                duration_millis(offset.saturating_add(record.timeline)),
                wall_clock_start(report, record).to_rfc3339(),
                duration_micros(record.response_time()),
                record.status.code(),
                record.rps,
                csv_field(record.phase.as_deref().unwrap_or_default()),
                csv_field(record.error.as_deref().unwrap_or_default()),
            );
            writer.write_all(line.as_bytes()).await.map_err(write_err)?;
        }
    }
    writer.flush().await.map_err(write_err)?;
    Ok(())
}

/// Summary per phase plus every record.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub async fn export_json(path: &str, reports: &[RunReport]) -> Result<(), ReportError> {
    let runs: Vec<serde_json::Value> = reports
        .iter()
        .zip(phase_offsets(reports))
        .map(|(report, offset)| {
            let records: Vec<serde_json::Value> = report
                .records
                .iter()
                .map(|record| {
                    serde_json::json!({
                        "timeline_ms": duration_millis(offset.saturating_add(record.timeline)),
                        "started_at": wall_clock_start(report, record).to_rfc3339(),
                        "latency_us": duration_micros(record.response_time()),
                        "status": record.status.code(),
                        "rps": record.rps,
                        "phase": record.phase.as_deref(),
                        "error": record.error.as_deref(),
                    })
                })
                .collect();
            serde_json::json!({
                "phase": report.settings.phase.as_deref(),
                "target": report.settings.target.as_str(),
                "started_at": report.started_at.to_rfc3339(),
                "offset_ms": duration_millis(offset),
                "stop_reason": report.stop_reason.to_string(),
                "summary": summary_json(&report.summary),
                "records": records,
            })
        })
        .collect();
    let payload = serde_json::json!({ "runs": runs });
    let json = serde_json::to_vec_pretty(&payload)
        .map_err(|source| ReportError::Serialize { source })?;

    let write_err = |source| ReportError::Write {
        path: Path::new(path).to_path_buf(),
        source,
    };
    let file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&json).await.map_err(write_err)?;
    writer.flush().await.map_err(write_err)?;
    Ok(())
}

fn summary_json(summary: &Summary) -> serde_json::Value {
    let percentiles = |table: &crate::engine::PercentileTable| -> serde_json::Value {
        table
            .rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "percentile": row.percentile,
                    "latency_us": duration_micros(row.latency),
                })
            })
            .collect()
    };
    let status_counts: serde_json::Map<String, serde_json::Value> = summary
        .status_counts
        .iter()
        .map(|(code, count)| (code.to_string(), serde_json::Value::from(*count)))
        .collect();
    serde_json::json!({
        "total": summary.total,
        "ok": summary.ok,
        "errors": summary.errors,
        "timeouts": summary.timeouts,
        "transport_errors": summary.transport_errors,
        "elapsed_ms": duration_millis(summary.elapsed),
        "mean_ok_latency_us": duration_micros(summary.mean_ok_latency),
        "max_latency_us": duration_micros(summary.max_latency),
        "avg_rps_x100": summary.avg_rps_x100,
        "peak_rps": summary.peak_rps,
        "ok_percentiles": percentiles(&summary.ok_percentiles),
        "error_percentiles": percentiles(&summary.error_percentiles),
        "status_counts": status_counts,
        "first_error": summary.first_error.as_deref(),
    })
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
