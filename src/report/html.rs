use std::path::Path;

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::engine::RunReport;
use crate::error::ReportError;

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>volley report</title>
<style>
body { font-family: sans-serif; margin: 2rem; color: #222; }
h1 { font-size: 1.4rem; }
canvas { border: 1px solid #ccc; width: 100%; height: 360px; }
.legend span { margin-right: 1.5rem; }
</style>
</head>
<body>
<h1>Load test: {{ENDPOINT}}</h1>
<p>{{SUMMARY}}</p>
<div class="legend"><span style="color:#1f77b4">latency (ms)</span><span style="color:#d62728">requests per second</span></div>
<canvas id="chart" width="1200" height="360"></canvas>
<script>
const data = {{DATA}}.map(d => ({ ...d, latency: d.latency_us / 1000 }));
const canvas = document.getElementById("chart");
const ctx = canvas.getContext("2d");
function plot(key, color) {
  if (data.length === 0) { return; }
  const maxX = data.reduce((m, d) => Math.max(m, d.time), 0) || 1;
  const maxY = data.reduce((m, d) => Math.max(m, d[key]), 0) || 1;
  ctx.strokeStyle = color;
  ctx.beginPath();
  data.forEach((d, i) => {
    const x = (d.time / maxX) * (canvas.width - 20) + 10;
    const y = canvas.height - 10 - (d[key] / maxY) * (canvas.height - 20);
    if (i === 0) { ctx.moveTo(x, y); } else { ctx.lineTo(x, y); }
  });
  ctx.stroke();
}
plot("latency", "#1f77b4");
plot("rps", "#d62728");
</script>
</body>
</html>
"##;

/// Writes a self-contained chart page for every record of every phase.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub async fn write_html_report(path: &str, reports: &[RunReport]) -> Result<(), ReportError> {
    let page = render_page(reports)?;
    let write_err = |source| ReportError::Write {
        path: Path::new(path).to_path_buf(),
        source,
    };
    let file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(page.as_bytes()).await.map_err(write_err)?;
    writer.flush().await.map_err(write_err)?;
    Ok(())
}

pub(crate) fn render_page(reports: &[RunReport]) -> Result<String, ReportError> {
    let endpoint = reports
        .first()
        .map(|report| report.settings.target.as_str())
        .unwrap_or_default();

    let mut points: Vec<(std::time::Duration, serde_json::Value)> = reports
        .iter()
        .zip(super::phase_offsets(reports))
        .flat_map(|(report, offset)| report.records.iter().map(move |record| (offset, record)))
        .map(|(offset, record)| {
            let latency_us = super::duration_micros(record.response_time());
            let timeline = offset.saturating_add(record.timeline);
            (
                timeline,
                serde_json::json!({
                    "time": timeline.as_secs_f64(),
                    "latency_us": latency_us,
                    "rps": record.rps,
                    "phase": record.phase.as_deref(),
                }),
            )
        })
        .collect();
    points.sort_by_key(|(timeline, _)| *timeline);
    let data: Vec<serde_json::Value> = points.into_iter().map(|(_, value)| value).collect();
    let json =
        serde_json::to_string(&data).map_err(|source| ReportError::Serialize { source })?;

    let total: u64 = reports.iter().map(|report| report.summary.total).sum();
    let errors: u64 = reports.iter().map(|report| report.summary.errors).sum();
    let summary = format!("{} requests, {} errors, {} phase(s)", total, errors, reports.len());

    Ok(TEMPLATE
        .replace("{{ENDPOINT}}", &escape_html(endpoint))
        .replace("{{SUMMARY}}", &summary)
        .replace("{{DATA}}", &json.replace("</", "<\\/")))
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
