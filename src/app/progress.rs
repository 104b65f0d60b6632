use std::io::{IsTerminal, Write};

use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};

use crate::engine::{Progress, ProgressHandle};

/// Redraws the progress line on stderr for every published snapshot until
/// the run finishes.
pub(crate) fn setup_progress_printer(
    mut handle: ProgressHandle,
    no_color: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !std::io::stderr().is_terminal() {
            return;
        }
        let mut drawn = false;
        while let Some(progress) = handle.changed().await {
            if render_progress_line(&progress, no_color).is_err() {
                return;
            }
            drawn = true;
        }
        if drawn && finish_progress_line().is_err() {
            tracing::debug!("Failed to finish the progress line.");
        }
    })
}

fn render_progress_line(progress: &Progress, no_color: bool) -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    for (text, color) in progress_segments(progress) {
        match color {
            Some(color) if !no_color => {
                queue!(out, SetForegroundColor(color), Print(&text), ResetColor)?;
            }
            Some(_) | None => queue!(out, Print(&text))?,
        }
    }
    out.flush()?;
    Ok(())
}

fn finish_progress_line() -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub(crate) fn format_progress(progress: &Progress) -> String {
    progress_segments(progress)
        .into_iter()
        .map(|(text, _)| text)
        .collect()
}

fn progress_segments(progress: &Progress) -> Vec<(String, Option<Color>)> {
    let ratio_whole = progress.error_ratio_bp.checked_div(100).unwrap_or(0);
    let ratio_frac = progress.error_ratio_bp.checked_rem(100).unwrap_or(0);
    let error_color = if progress.error_ratio_bp > 0 {
        Color::Red
    } else {
        Color::Green
    };
    vec![
        (
            format!("Requests: {} ({}%)", progress.requests, progress.percent_done),
            Some(Color::Cyan),
        ),
        (
            format!(", requests per second: {}", progress.rps),
            Some(Color::Yellow),
        ),
        (
            format!(", Error ratio: {}.{:02}%", ratio_whole, ratio_frac),
            Some(error_color),
        ),
        (
            format!(", mean latency: {} ms", progress.mean_latency.as_millis()),
            None,
        ),
    ]
}
