use std::future::Future;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::analytics::{self, percentile_table, window_rps};
use super::progress::TickStats;
use super::*;
use crate::error::ConfigError;

type Respond = fn(u64) -> SendOutcome;

struct ScriptedTransport {
    sent: Mutex<Vec<u64>>,
    delay: Duration,
    respond: Respond,
}

impl ScriptedTransport {
    fn new(delay: Duration, respond: Respond) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            delay,
            respond,
        })
    }

    fn sent(&self) -> Result<Vec<u64>, String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .map_err(|err| format!("sent log poisoned: {}", err))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, template: &RequestTemplate, _timeout: Duration) -> SendOutcome {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(template.seq());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(template.seq())
    }
}

fn always_ok(_seq: u64) -> SendOutcome {
    SendOutcome::Response { status: 200 }
}

fn explode_on_fifth(seq: u64) -> SendOutcome {
    if seq == 5 {
        std::panic::resume_unwind(Box::new("transport exploded"));
    }
    SendOutcome::Response { status: 200 }
}

fn always_explode(_seq: u64) -> SendOutcome {
    std::panic::resume_unwind(Box::new("transport exploded"))
}

fn mixed_outcomes(seq: u64) -> SendOutcome {
    match seq % 4 {
        0 => SendOutcome::Response { status: 200 },
        1 => SendOutcome::Response { status: 404 },
        2 => SendOutcome::TimedOut,
        _ => SendOutcome::Failed {
            message: "connection refused".to_owned(),
        },
    }
}

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn run_parallel_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn unique_seqs(report: &RunReport) -> Result<usize, String> {
    let mut seqs: Vec<u64> = report.records.iter().map(|record| record.seq).collect();
    seqs.sort_unstable();
    let total = seqs.len();
    seqs.dedup();
    if seqs.len() != total {
        return Err(format!("{} duplicate records", total.saturating_sub(seqs.len())));
    }
    Ok(total)
}

fn run_paused_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn count_settings(requests: u64, vu: usize) -> Result<Settings, String> {
    Settings::builder()
        .target("http://127.0.0.1:9/")
        .vu(vu)
        .max_requests(Some(requests))
        .build()
        .map_err(|err| format!("settings rejected: {}", err))
}

fn duration_settings(duration: Duration, vu: usize) -> Result<Settings, String> {
    Settings::builder()
        .target("http://127.0.0.1:9/")
        .vu(vu)
        .duration(Some(duration))
        .build()
        .map_err(|err| format!("settings rejected: {}", err))
}

fn record_at(base: Instant, seq: u64, received_ms: u64, latency_ms: u64, status: RequestStatus) -> ResultRecord {
    let end = base + Duration::from_millis(received_ms);
    let start = end
        .checked_sub(Duration::from_millis(latency_ms))
        .unwrap_or(end);
    ResultRecord::new(seq, start, end, status, None)
}

#[test]
fn settings_reject_both_stop_conditions() -> Result<(), String> {
    let result = Settings::builder()
        .target("http://localhost/")
        .max_requests(Some(10))
        .duration(Some(Duration::from_secs(1)))
        .build();
    match result {
        Err(ConfigError::ConflictingStopConditions) => Ok(()),
        other => Err(format!("Expected conflicting stop conditions, got {:?}", other)),
    }
}

#[test]
fn settings_reject_missing_stop_condition() -> Result<(), String> {
    match Settings::builder().target("http://localhost/").build() {
        Err(ConfigError::MissingStopCondition) => Ok(()),
        other => Err(format!("Expected missing stop condition, got {:?}", other)),
    }
}

#[test]
fn settings_reject_zero_values() -> Result<(), String> {
    let base = || {
        Settings::builder()
            .target("http://localhost/")
            .max_requests(Some(1))
    };
    if !matches!(base().vu(0).build(), Err(ConfigError::ZeroVirtualUsers)) {
        return Err("Expected zero vu to be rejected".to_owned());
    }
    if !matches!(base().constant_rps(Some(0)).build(), Err(ConfigError::ZeroRate)) {
        return Err("Expected zero rate to be rejected".to_owned());
    }
    if !matches!(
        base().request_timeout(Duration::ZERO).build(),
        Err(ConfigError::ZeroTimeout)
    ) {
        return Err("Expected zero timeout to be rejected".to_owned());
    }
    if !matches!(
        Settings::builder()
            .target("http://localhost/")
            .max_requests(Some(0))
            .build(),
        Err(ConfigError::ZeroRequests)
    ) {
        return Err("Expected zero requests to be rejected".to_owned());
    }
    Ok(())
}

#[test]
fn settings_reject_bad_targets() -> Result<(), String> {
    let build = |target: &str| {
        Settings::builder()
            .target(target)
            .max_requests(Some(1))
            .build()
    };
    if !matches!(build("not a url"), Err(ConfigError::InvalidTarget { .. })) {
        return Err("Expected unparsable target to be rejected".to_owned());
    }
    if !matches!(build("ftp://example.com/"), Err(ConfigError::UnsupportedScheme { .. })) {
        return Err("Expected ftp target to be rejected".to_owned());
    }
    if !matches!(
        Settings::builder().max_requests(Some(1)).build(),
        Err(ConfigError::MissingTarget)
    ) {
        return Err("Expected missing target to be rejected".to_owned());
    }
    Ok(())
}

#[test]
fn settings_default_timeout_and_single_vu() -> Result<(), String> {
    let settings = count_settings(3, 1)?;
    if settings.request_timeout != DEFAULT_REQUEST_TIMEOUT {
        return Err(format!("Unexpected timeout {:?}", settings.request_timeout));
    }
    if settings.vu.get() != 1 || settings.stop.max_requests() != Some(3) {
        return Err(format!("Unexpected settings {:?}", settings));
    }
    Ok(())
}

#[test]
fn latch_fires_once_and_releases_late_waiters() -> Result<(), String> {
    run_async_test(async {
        let latch = Latch::new();
        let observer = latch.clone();
        if observer.is_fired() {
            return Err("Latch should start unfired".to_owned());
        }
        if !latch.fire() {
            return Err("First fire should report the transition".to_owned());
        }
        if latch.fire() {
            return Err("Second fire should be a no-op".to_owned());
        }
        tokio::time::timeout(Duration::from_secs(1), observer.wait())
            .await
            .map_err(|_elapsed| "wait did not return after fire".to_owned())?;
        Ok(())
    })
}

#[test]
fn work_queue_enqueue_dequeue_and_clear() -> Result<(), String> {
    let queue = WorkQueue::new();
    let mut factory = TemplateFactory::new(count_settings(1, 1)?.request_spec());
    let added = queue.enqueue_many(factory.batch(5));
    if added != 5 || queue.len() != 5 {
        return Err(format!("Expected 5 queued, got {} / {}", added, queue.len()));
    }
    let reader = queue.reader();
    let first = reader
        .try_dequeue()
        .ok_or_else(|| "Expected a template".to_owned())?;
    if first.seq() != 0 {
        return Err(format!("Expected FIFO order, got seq {}", first.seq()));
    }
    if queue.clear() != 4 || !reader.is_empty() {
        return Err("Expected clear to drop the remaining 4".to_owned());
    }
    if reader.try_dequeue().is_some() {
        return Err("Queue should be empty after clear".to_owned());
    }
    Ok(())
}

#[test]
fn topup_refills_below_watermark_and_escalates() -> Result<(), String> {
    let vu = std::num::NonZeroUsize::new(2).ok_or_else(|| "nonzero".to_owned())?;
    let mut policy = TopupPolicy::for_virtual_users(vu);
    let now = Instant::now();
    if policy.check(2_000, now).is_some() {
        return Err("Depth at the watermark must not refill".to_owned());
    }
    if policy.check(1_999, now) != Some(8_000) {
        return Err("First breach should refill 4000 per vu".to_owned());
    }
    let soon = now + Duration::from_millis(500);
    if policy.check(10, soon) != Some(9_000) {
        return Err("Breach within the window should escalate by 1000".to_owned());
    }
    let later = soon + Duration::from_secs(5);
    if policy.check(10, later) != Some(9_000) || policy.escalations() != 1 {
        return Err("Breach outside the window should keep the size".to_owned());
    }
    Ok(())
}

#[test]
fn permit_schedule_grants_exact_rate_per_second() -> Result<(), String> {
    for rate in [1_u64, 7, 10, 15, 100, 1_234] {
        let mut schedule = PermitSchedule::new(rate);
        let ceiling = usize::try_from(rate.div_ceil(10)).map_err(|err| err.to_string())?;
        let mut granted: u64 = 0;
        for _ in 0..10 {
            let tick = schedule.next_tick();
            if tick > ceiling {
                return Err(format!("rate {}: tick granted {} > {}", rate, tick, ceiling));
            }
            granted += u64::try_from(tick).map_err(|err| err.to_string())?;
        }
        if granted != rate {
            return Err(format!("rate {}: granted {} over one second", rate, granted));
        }
    }
    Ok(())
}

#[test]
fn tick_stats_snapshot_describes_last_tick() -> Result<(), String> {
    let base = Instant::now();
    let mut stats = TickStats::default();
    for seq in 0..8 {
        stats.observe(&record_at(base, seq, 100, 10, RequestStatus::Http(200)));
    }
    stats.observe(&record_at(base, 8, 100, 900, RequestStatus::Http(500)));
    stats.observe(&record_at(base, 9, 100, 900, RequestStatus::Timeout));

    let progress = stats.snapshot(42, 130, Duration::from_secs(3), Duration::from_secs(1));
    if progress.requests != 42 || progress.percent_done != 100 {
        return Err(format!("Unexpected totals {:?}", progress));
    }
    if progress.rps != 10 || progress.error_ratio_bp != 2_000 {
        return Err(format!("Unexpected tick rates {:?}", progress));
    }
    if progress.mean_latency != Duration::from_millis(10) {
        return Err(format!("Mean latency should ignore errors: {:?}", progress));
    }
    let empty = stats.snapshot(42, 50, Duration::from_secs(4), Duration::from_secs(1));
    if empty.rps != 0 || empty.mean_latency != Duration::ZERO {
        return Err(format!("Accumulator should reset: {:?}", empty));
    }
    Ok(())
}

#[test]
fn window_rps_counts_trailing_second() -> Result<(), String> {
    let base = Instant::now();
    let records: Vec<ResultRecord> = [0_u64, 200, 500, 900, 1_200]
        .iter()
        .zip(0_u64..)
        .map(|(&ms, seq)| record_at(base, seq, ms, 1, RequestStatus::Http(200)))
        .collect();
    let counts = window_rps(&records);
    if counts != vec![1, 2, 3, 4, 3] {
        return Err(format!("Unexpected window counts {:?}", counts));
    }
    Ok(())
}

#[test]
fn window_rps_excludes_exact_window_edge_and_later_ties() -> Result<(), String> {
    let base = Instant::now();
    let records = vec![
        record_at(base, 0, 0, 1, RequestStatus::Http(200)),
        record_at(base, 1, 1_000, 1, RequestStatus::Http(200)),
        record_at(base, 2, 1_000, 1, RequestStatus::Http(200)),
    ];
    let counts = window_rps(&records);
    if counts != vec![1, 1, 2] {
        return Err(format!("Unexpected window counts {:?}", counts));
    }
    Ok(())
}

#[test]
fn percentiles_use_round_half_up_index() -> Result<(), String> {
    let table = percentile_table(
        [10_u64, 20, 30, 40, 100]
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect(),
    );
    if table.get(50) != Some(Duration::from_millis(40)) {
        return Err(format!("Unexpected p50 {:?}", table.get(50)));
    }
    if table.get(100) != Some(Duration::from_millis(100)) {
        return Err(format!("p100 must be the max, got {:?}", table.get(100)));
    }
    if !percentile_table(Vec::new()).is_empty() {
        return Err("Empty samples should yield an empty table".to_owned());
    }
    Ok(())
}

#[test]
fn analyze_is_idempotent_and_sorts_by_receipt() -> Result<(), String> {
    let base = Instant::now();
    let mut records = vec![
        record_at(base, 2, 900, 30, RequestStatus::Http(200)),
        record_at(base, 0, 0, 10, RequestStatus::Http(200)),
        record_at(base, 1, 500, 20, RequestStatus::Http(503)),
    ];
    let first = analytics::analyze(&mut records, Duration::from_secs(1));
    let first_rps: Vec<u64> = records.iter().map(|record| record.rps).collect();
    let second = analytics::analyze(&mut records, Duration::from_secs(1));
    let second_rps: Vec<u64> = records.iter().map(|record| record.rps).collect();

    let order: Vec<u64> = records.iter().map(|record| record.seq).collect();
    if order != vec![0, 1, 2] {
        return Err(format!("Records not sorted by receipt: {:?}", order));
    }
    if first != second || first_rps != second_rps {
        return Err("Second analysis pass changed the results".to_owned());
    }
    if first.ok != 2 || first.errors != 1 || first.avg_rps_x100 != 300 {
        return Err(format!("Unexpected summary {:?}", first));
    }
    if first.mean_ok_latency != Duration::from_millis(20) {
        return Err(format!("Unexpected mean {:?}", first.mean_ok_latency));
    }
    Ok(())
}

#[test]
fn count_mode_yields_exactly_one_record_per_template() -> Result<(), String> {
    run_async_test(async {
        for vu in [1_usize, 4, 16] {
            let transport = ScriptedTransport::new(Duration::ZERO, always_ok);
            let manager = Manager::new(count_settings(300, vu)?, transport.clone());
            let report = manager
                .run()
                .await
                .map_err(|err| format!("run failed: {}", err))?;

            let mut seqs: Vec<u64> = report.records.iter().map(|record| record.seq).collect();
            seqs.sort_unstable();
            if seqs != (0..300).collect::<Vec<u64>>() {
                return Err(format!("vu {}: records do not cover each template once", vu));
            }
            if transport.sent()?.len() != 300 {
                return Err(format!("vu {}: transport saw extra sends", vu));
            }
            if report.workers_exited != vu || report.stop_reason != StopReason::MaxRequestsReached {
                return Err(format!(
                    "vu {}: exited {} reason {:?}",
                    vu, report.workers_exited, report.stop_reason
                ));
            }
            if report.summary.ok != 300 {
                return Err(format!("vu {}: unexpected ok count {}", vu, report.summary.ok));
            }
        }
        Ok(())
    })
}

#[test]
fn parallel_workers_yield_exactly_one_record_per_template() -> Result<(), String> {
    run_parallel_test(async {
        for round in 0..10 {
            let transport = ScriptedTransport::new(Duration::ZERO, always_ok);
            let manager = Manager::new(count_settings(5_000, 64)?, transport.clone());
            let report = manager
                .run()
                .await
                .map_err(|err| format!("run failed: {}", err))?;

            let mut seqs: Vec<u64> = report.records.iter().map(|record| record.seq).collect();
            seqs.sort_unstable();
            if seqs != (0..5_000).collect::<Vec<u64>>() {
                return Err(format!("round {}: records do not cover each template once", round));
            }
            let mut sent = transport.sent()?;
            sent.sort_unstable();
            if sent != seqs {
                return Err(format!("round {}: sends and records disagree", round));
            }
            if report.workers_exited != 64 || report.stop_reason != StopReason::MaxRequestsReached {
                return Err(format!(
                    "round {}: exited {} reason {:?}",
                    round, report.workers_exited, report.stop_reason
                ));
            }
        }
        Ok(())
    })
}

#[test]
fn parallel_duration_run_drains_in_flight_requests() -> Result<(), String> {
    run_parallel_test(async {
        let transport = ScriptedTransport::new(Duration::from_millis(2), always_ok);
        let manager = Manager::new(duration_settings(Duration::from_millis(300), 32)?, transport.clone());
        let report = manager
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;

        let recorded = unique_seqs(&report)?;
        let sent = transport.sent()?.len();
        if recorded == 0 || sent != recorded {
            return Err(format!("{} sends but {} records", sent, recorded));
        }
        if report.stop_reason != StopReason::DurationElapsed || report.workers_exited != 32 {
            return Err(format!(
                "reason {:?}, {} workers exited",
                report.stop_reason, report.workers_exited
            ));
        }
        if report.discarded_templates == 0 {
            return Err("pending templates should be discarded at stop".to_owned());
        }
        Ok(())
    })
}

#[test]
fn parallel_interrupt_drains_in_flight_requests() -> Result<(), String> {
    run_parallel_test(async {
        let transport = ScriptedTransport::new(Duration::from_millis(3), always_ok);
        let manager = Manager::new(duration_settings(Duration::from_secs(60), 16)?, transport.clone());
        let stop = manager.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop.request_stop();
        });
        let report = manager
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;

        let recorded = unique_seqs(&report)?;
        if transport.sent()?.len() != recorded {
            return Err("an in-flight request was lost at interrupt".to_owned());
        }
        if report.stop_reason != StopReason::Interrupted || report.workers_exited != 16 {
            return Err(format!(
                "reason {:?}, {} workers exited",
                report.stop_reason, report.workers_exited
            ));
        }
        Ok(())
    })
}

#[test]
fn worker_fault_is_recorded_and_run_completes() -> Result<(), String> {
    run_async_test(async {
        let transport = ScriptedTransport::new(Duration::ZERO, explode_on_fifth);
        let report = Manager::new(count_settings(50, 4)?, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report.records.len() != 50 {
            return Err(format!("Expected 50 records, got {}", report.records.len()));
        }
        let faults: Vec<&ResultRecord> = report
            .records
            .iter()
            .filter(|record| record.status == RequestStatus::Transport)
            .collect();
        let [fault] = faults.as_slice() else {
            return Err(format!("Expected one fault record, got {}", faults.len()));
        };
        if fault.seq != 5
            || !fault
                .error
                .as_deref()
                .is_some_and(|message| message.contains("transport exploded"))
        {
            return Err(format!("Unexpected fault record {:?}", fault));
        }
        if report.workers_exited != 4 {
            return Err(format!("Expected 4 exits, got {}", report.workers_exited));
        }
        Ok(())
    })
}

#[test]
fn run_finishes_when_every_worker_faults() -> Result<(), String> {
    run_async_test(async {
        let transport = ScriptedTransport::new(Duration::ZERO, always_explode);
        let report = Manager::new(count_settings(100, 2)?, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report.stop_reason != StopReason::WorkersExited {
            return Err(format!("Unexpected stop reason {:?}", report.stop_reason));
        }
        if report.records.len() != 2 || report.summary.transport_errors != 2 {
            return Err(format!("Expected two fault records, got {}", report.records.len()));
        }
        Ok(())
    })
}

#[test]
fn outcomes_map_to_statuses() -> Result<(), String> {
    run_async_test(async {
        let transport = ScriptedTransport::new(Duration::ZERO, mixed_outcomes);
        let report = Manager::new(count_settings(40, 3)?, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        let summary = &report.summary;
        if summary.ok != 10 || summary.errors != 30 {
            return Err(format!("Unexpected ok/error split {:?}", summary));
        }
        if summary.timeouts != 10 || summary.transport_errors != 10 {
            return Err(format!("Unexpected failure split {:?}", summary));
        }
        let expected = [(200_u16, 10_u64), (404, 10), (598, 10), (599, 10)];
        for (code, count) in expected {
            if summary.status_counts.get(&code) != Some(&count) {
                return Err(format!("Status {} count mismatch: {:?}", code, summary.status_counts));
            }
        }
        if summary.first_error.as_deref().is_none() {
            return Err("Expected a first error message".to_owned());
        }
        Ok(())
    })
}

#[test]
fn slow_transport_is_cut_by_request_timeout() -> Result<(), String> {
    run_paused_test(async {
        let transport = ScriptedTransport::new(Duration::from_secs(10), always_ok);
        let settings = Settings::builder()
            .target("http://127.0.0.1:9/")
            .max_requests(Some(2))
            .request_timeout(Duration::from_millis(50))
            .build()
            .map_err(|err| err.to_string())?;
        let report = Manager::new(settings, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report.summary.timeouts != 2 {
            return Err(format!("Expected 2 timeouts, got {:?}", report.summary));
        }
        let latency = report.summary.max_latency;
        if latency < Duration::from_millis(50) || latency > Duration::from_millis(100) {
            return Err(format!("Timed out attempts should end at the deadline, got {:?}", latency));
        }
        Ok(())
    })
}

#[test]
fn duration_mode_drains_every_in_flight_request() -> Result<(), String> {
    run_paused_test(async {
        let transport = ScriptedTransport::new(Duration::from_millis(20), always_ok);
        let settings = duration_settings(Duration::from_millis(500), 4)?;
        let manager = Manager::new(settings, transport.clone());
        let state = manager.state();
        let report = manager
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;

        let sent = transport.sent()?.len();
        if sent != report.records.len() {
            return Err(format!("{} sends but {} records", sent, report.records.len()));
        }
        if report.records.is_empty() || report.stop_reason != StopReason::DurationElapsed {
            return Err(format!("Unexpected run {:?}", report.stop_reason));
        }
        if *state.borrow() != RunState::Done || report.workers_exited != 4 {
            return Err("Run should end in Done with every worker exited".to_owned());
        }
        if report
            .records
            .iter()
            .any(|record| record.timeline > Duration::from_millis(520))
        {
            return Err("A request started after stop".to_owned());
        }
        Ok(())
    })
}

#[test]
fn duration_mode_tops_up_the_queue() -> Result<(), String> {
    run_paused_test(async {
        let transport = ScriptedTransport::new(Duration::from_millis(1), always_ok);
        let policy = TopupPolicy::with_limits(5, 10, 5, Duration::from_secs(1));
        let report = Manager::new(duration_settings(Duration::from_millis(300), 2)?, transport)
            .with_topup_policy(policy)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report.records.len() <= 10 {
            return Err(format!(
                "Expected top-ups beyond the seed, got {} records",
                report.records.len()
            ));
        }
        Ok(())
    })
}

#[test]
fn throttle_holds_constant_rate() -> Result<(), String> {
    run_paused_test(async {
        let transport = ScriptedTransport::new(Duration::ZERO, always_ok);
        let settings = Settings::builder()
            .target("http://127.0.0.1:9/")
            .vu(8)
            .duration(Some(Duration::from_secs(2)))
            .constant_rps(Some(50))
            .build()
            .map_err(|err| err.to_string())?;
        let report = Manager::new(settings, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        let count = report.records.len();
        if !(95..=105).contains(&count) {
            return Err(format!("Expected about 100 requests at 50 rps, got {}", count));
        }
        Ok(())
    })
}

#[test]
fn stop_handle_interrupts_a_long_run() -> Result<(), String> {
    run_paused_test(async {
        let transport = ScriptedTransport::new(Duration::from_millis(5), always_ok);
        let manager = Manager::new(duration_settings(Duration::from_secs(60), 2)?, transport);
        let stop = manager.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.request_stop();
        });
        let report = manager
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report.stop_reason != StopReason::Interrupted {
            return Err(format!("Unexpected stop reason {:?}", report.stop_reason));
        }
        if report.elapsed > Duration::from_secs(1) {
            return Err(format!("Run did not stop promptly: {:?}", report.elapsed));
        }
        Ok(())
    })
}

#[test]
fn phase_label_is_stamped_on_records() -> Result<(), String> {
    run_async_test(async {
        let settings = Settings::builder()
            .target("http://127.0.0.1:9/")
            .max_requests(Some(3))
            .phase(Some("warmup".to_owned()))
            .build()
            .map_err(|err| err.to_string())?;
        let transport = ScriptedTransport::new(Duration::ZERO, always_ok);
        let report = Manager::new(settings, transport)
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        if report
            .records
            .iter()
            .any(|record| record.phase.as_deref() != Some("warmup"))
        {
            return Err("Every record should carry the phase label".to_owned());
        }
        Ok(())
    })
}

#[test]
fn progress_handle_sees_final_snapshot() -> Result<(), String> {
    run_async_test(async {
        let transport = ScriptedTransport::new(Duration::ZERO, always_ok);
        let manager = Manager::new(count_settings(20, 2)?, transport)
            .with_progress_tick(Duration::from_millis(10));
        let progress = manager.progress();
        let _report = manager
            .run()
            .await
            .map_err(|err| format!("run failed: {}", err))?;
        let last = progress.current();
        if last.requests != 20 || last.percent_done != 100 {
            return Err(format!("Unexpected final progress {:?}", last));
        }
        Ok(())
    })
}

#[test]
fn throttle_stops_waiting_once_stop_fires() -> Result<(), String> {
    run_paused_test(async {
        let rate = NonZeroU64::new(1).ok_or_else(|| "nonzero".to_owned())?;
        let throttle = Throttle::new(rate);
        let stop = Latch::new();
        let waiter = {
            let stop = stop.clone();
            async move { throttle.acquire(&stop).await }
        };
        stop.fire();
        if waiter.await {
            return Err("No permit should be granted after stop".to_owned());
        }
        Ok(())
    })
}

#[test]
fn restored_permits_never_exceed_one_second_of_budget() -> Result<(), String> {
    run_paused_test(async {
        let rate = NonZeroU64::new(2).ok_or_else(|| "nonzero".to_owned())?;
        let throttle = Throttle::new(rate);
        let stop = Latch::new();
        for _ in 0..5 {
            throttle.restore();
        }
        for attempt in 0..2 {
            let granted = tokio::time::timeout(Duration::from_millis(10), throttle.acquire(&stop))
                .await
                .map_err(|_elapsed| format!("banked permit {} missing", attempt))?;
            if !granted {
                return Err(format!("banked permit {} refused", attempt));
            }
        }
        if tokio::time::timeout(Duration::from_millis(50), throttle.acquire(&stop))
            .await
            .is_ok()
        {
            return Err("restore banked more than the burst cap".to_owned());
        }
        Ok(())
    })
}
