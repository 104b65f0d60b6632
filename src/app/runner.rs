use std::sync::Arc;

use tracing::{info, warn};

use crate::args::CliArgs;
use crate::engine::{HttpTransport, Latch, Manager, RunReport, StopReason, Transport};
use crate::error::AppResult;
use crate::report;

use super::plan::{ReportTargets, build_plan};
use super::{progress, signals};

pub(crate) async fn run_load_test(args: &CliArgs) -> AppResult<()> {
    let plan = build_plan(args)?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&plan.transport)?);

    let interrupted = Latch::new();
    let signal_handle = signals::setup_signal_handler(interrupted.clone());

    let phase_count = plan.phases.len();
    let mut reports = Vec::with_capacity(phase_count);
    for settings in plan.phases {
        if interrupted.is_fired() {
            info!(
                "Skipping {} remaining phase(s) after interrupt.",
                phase_count.saturating_sub(reports.len())
            );
            break;
        }
        if let Some(phase) = settings.phase.as_deref() {
            info!("Starting phase '{}'", phase);
        }

        let manager = Manager::new(settings, Arc::clone(&transport));
        let progress_handle = plan
            .show_progress
            .then(|| progress::setup_progress_printer(manager.progress(), plan.no_color));
        let stop = manager.stop_handle();
        let forward_interrupt = {
            let interrupted = interrupted.clone();
            tokio::spawn(async move {
                interrupted.wait().await;
                stop.request_stop();
            })
        };

        let outcome = manager.run().await;
        forward_interrupt.abort();
        if let Some(handle) = progress_handle {
            handle.await?;
        }
        let phase_report = outcome?;
        if phase_report.stop_reason == StopReason::WorkersExited {
            warn!("Every virtual user faulted; the results are incomplete.");
        }
        report::print_summary(&phase_report);
        reports.push(phase_report);
    }
    signal_handle.abort();

    write_reports(&plan.reports, &reports).await
}

async fn write_reports(targets: &ReportTargets, reports: &[RunReport]) -> AppResult<()> {
    if !targets.any() {
        return Ok(());
    }
    if let Some(path) = targets.csv.as_deref() {
        report::export_csv(path, reports).await?;
        info!("Records written to {}", path);
    }
    if let Some(path) = targets.json.as_deref() {
        report::export_json(path, reports).await?;
        info!("Records written to {}", path);
    }
    if let Some(path) = targets.html.as_deref() {
        report::write_html_report(path, reports).await?;
        info!("Report saved to {}", path);
    }
    Ok(())
}
