use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;

use super::analytics::{self, Summary};
use super::latch::Latch;
use super::progress::{Progress, ProgressHandle, TickStats};
use super::queue::{WorkQueue, result_queue};
use super::record::ResultRecord;
use super::settings::{Settings, StopCondition};
use super::template::TemplateFactory;
use super::throttle::Throttle;
use super::topup::TopupPolicy;
use super::transport::Transport;
use super::worker::{WorkerContext, WorkerExit, run_worker};

const PROGRESS_TICK: Duration = Duration::from_secs(1);
const TOPUP_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Preparing,
    Running,
    Draining,
    Analyzing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxRequestsReached,
    DurationElapsed,
    Interrupted,
    WorkersExited,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::MaxRequestsReached => "request limit reached",
            Self::DurationElapsed => "duration elapsed",
            Self::Interrupted => "interrupted",
            Self::WorkersExited => "all workers exited",
        };
        f.write_str(text)
    }
}

/// Asks a running [`Manager`] to stop early.
#[derive(Debug, Clone)]
pub struct StopHandle {
    requested: Latch,
}

impl StopHandle {
    pub fn request_stop(&self) {
        if self.requested.fire() {
            info!("Stop requested; draining in-flight requests.");
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub settings: Settings,
    pub started_at: DateTime<Utc>,
    /// Monotonic origin of `timeline`; pairs with `started_at`.
    pub run_start: Instant,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    /// Sorted by receipt time, with `rps` filled in.
    pub records: Vec<ResultRecord>,
    pub summary: Summary,
    pub workers_exited: usize,
    pub discarded_templates: usize,
}

/// Orchestrates one run: seed, release, collect, stop, drain, analyze.
pub struct Manager {
    settings: Settings,
    transport: Arc<dyn Transport>,
    topup: TopupPolicy,
    progress_tick: Duration,
    topup_tick: Duration,
    progress_tx: watch::Sender<Progress>,
    state_tx: watch::Sender<RunState>,
    stop_requested: Latch,
}

impl Manager {
    #[must_use]
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let topup = TopupPolicy::for_virtual_users(settings.vu);
        let (progress_tx, _progress_rx) = watch::channel(Progress::default());
        let (state_tx, _state_rx) = watch::channel(RunState::Preparing);
        Self {
            settings,
            transport,
            topup,
            progress_tick: PROGRESS_TICK,
            topup_tick: TOPUP_TICK,
            progress_tx,
            state_tx,
            stop_requested: Latch::new(),
        }
    }

    #[must_use]
    pub const fn with_topup_policy(mut self, policy: TopupPolicy) -> Self {
        self.topup = policy;
        self
    }

    #[must_use]
    pub fn with_progress_tick(mut self, tick: Duration) -> Self {
        self.progress_tick = tick.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle::new(self.progress_tx.subscribe())
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            requested: self.stop_requested.clone(),
        }
    }

    fn enter(&self, state: RunState) {
        self.state_tx.send_replace(state);
        debug!("Run state -> {:?}", state);
    }

    /// Executes the run to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings fail validation; nothing is sent in
    /// that case.
    pub async fn run(mut self) -> Result<RunReport, ConfigError> {
        self.enter(RunState::Preparing);
        self.settings.validate()?;

        let queue = WorkQueue::new();
        let mut factory = TemplateFactory::new(self.settings.request_spec());
        let seeded = match self.settings.stop {
            StopCondition::MaxRequests(limit) => usize::try_from(limit.get()).unwrap_or(usize::MAX),
            StopCondition::Duration(_) => self.topup.topup_amount(),
        };
        queue.enqueue_many(factory.batch(seeded));

        let start_gate = Latch::new();
        let stop = Latch::new();
        let throttle = self.settings.constant_rps.map(|rate| Arc::new(Throttle::new(rate)));
        let exited = Arc::new(AtomicUsize::new(0));
        let (results_tx, mut results_rx) = result_queue();

        let vu = self.settings.vu.get();
        let mut workers = JoinSet::new();
        for id in 0..vu {
            workers.spawn(run_worker(WorkerContext {
                id,
                queue: queue.reader(),
                results: results_tx.clone(),
                transport: Arc::clone(&self.transport),
                throttle: throttle.clone(),
                start: start_gate.clone(),
                stop: stop.clone(),
                request_timeout: self.settings.request_timeout,
                exited: Arc::clone(&exited),
            }));
        }
        // Workers hold the only senders now; `recv` yields `None` once all exit.
        drop(results_tx);

        let started_at = Utc::now();
        let run_start = Instant::now();
        if let Some(throttle) = throttle.as_deref() {
            throttle.start();
        }
        start_gate.fire();
        self.enter(RunState::Running);
        info!(
            "Run started: {} {} with {} virtual users until {}",
            self.settings.method,
            self.settings.target,
            vu,
            self.settings.stop
        );

        let mut collector = Collector::new(&self.settings, run_start, self.progress_tick);
        let deadline = match self.settings.stop {
            StopCondition::Duration(duration) => run_start.checked_add(duration),
            StopCondition::MaxRequests(_) => None,
        };
        let duration_bounded = self.settings.stop.is_duration_bounded();
        let first_progress = run_start
            .checked_add(self.progress_tick)
            .unwrap_or(run_start);
        let mut progress_tick = interval_at(first_progress, self.progress_tick);
        progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut topup_tick = interval(self.topup_tick);
        topup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stop_reason = loop {
            tokio::select! {
                biased;
                () = self.stop_requested.wait() => break StopReason::Interrupted,
                () = wait_deadline(deadline) => break StopReason::DurationElapsed,
                _ = progress_tick.tick() => {
                    self.progress_tx.send_replace(collector.snapshot());
                }
                _ = topup_tick.tick(), if duration_bounded => {
                    if let Some(amount) = self.topup.check(queue.len(), Instant::now()) {
                        let added = queue.enqueue_many(factory.batch(amount));
                        debug!("Work queue topped up with {} templates", added);
                    }
                }
                received = results_rx.recv() => match received {
                    Some(record) => {
                        collector.receive(record);
                        if collector.limit_reached() {
                            break StopReason::MaxRequestsReached;
                        }
                    }
                    None => break StopReason::WorkersExited,
                },
            }
        };

        stop.fire();
        self.enter(RunState::Draining);
        let discarded_templates = queue.clear();
        if discarded_templates > 0 {
            debug!("Discarded {} pending templates", discarded_templates);
        }
        if stop_reason == StopReason::WorkersExited {
            warn!("All workers exited before the run finished.");
        }

        drain_results(&mut results_rx, &mut collector).await;
        join_workers(&mut workers).await;
        drop(throttle);

        let elapsed = run_start.elapsed();
        self.progress_tx.send_replace(collector.snapshot());
        info!(
            "Run finished ({}): {} records in {}ms",
            stop_reason,
            collector.records.len(),
            elapsed.as_millis()
        );

        self.enter(RunState::Analyzing);
        let mut records = collector.records;
        let summary = analytics::analyze(&mut records, elapsed);
        self.enter(RunState::Done);

        Ok(RunReport {
            settings: self.settings,
            started_at,
            run_start,
            elapsed,
            stop_reason,
            records,
            summary,
            workers_exited: exited.load(Ordering::Acquire),
            discarded_templates,
        })
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drain_results(
    results_rx: &mut mpsc::UnboundedReceiver<ResultRecord>,
    collector: &mut Collector,
) {
    while let Some(record) = results_rx.recv().await {
        collector.receive(record);
    }
}

async fn join_workers(workers: &mut JoinSet<WorkerExit>) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(WorkerExit::Faulted) => warn!("A worker left the pool after a fault."),
            Ok(WorkerExit::Stopped | WorkerExit::ResultsClosed) => {}
            Err(err) => error!("Worker task failed: {}", err),
        }
    }
}

/// Result-store side of the orchestrator.
struct Collector {
    records: Vec<ResultRecord>,
    tick: TickStats,
    run_start: Instant,
    progress_tick: Duration,
    stop: StopCondition,
    phase: Option<Arc<str>>,
}

impl Collector {
    fn new(settings: &Settings, run_start: Instant, progress_tick: Duration) -> Self {
        let capacity = settings
            .stop
            .max_requests()
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(0)
            .min(1_000_000);
        Self {
            records: Vec::with_capacity(capacity),
            tick: TickStats::default(),
            run_start,
            progress_tick,
            stop: settings.stop,
            phase: settings.phase.clone(),
        }
    }

    fn receive(&mut self, mut record: ResultRecord) {
        record.mark_received(Instant::now(), self.run_start, self.phase.as_ref());
        self.tick.observe(&record);
        self.records.push(record);
    }

    fn completed(&self) -> u64 {
        u64::try_from(self.records.len()).unwrap_or(u64::MAX)
    }

    fn limit_reached(&self) -> bool {
        self.stop
            .max_requests()
            .is_some_and(|limit| self.completed() >= limit)
    }

    fn snapshot(&mut self) -> Progress {
        let elapsed = self.run_start.elapsed();
        let percent_done = match self.stop {
            StopCondition::MaxRequests(limit) => self
                .completed()
                .saturating_mul(100)
                .checked_div(limit.get())
                .unwrap_or(0),
            StopCondition::Duration(duration) => {
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                let total_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                elapsed_ms.saturating_mul(100).checked_div(total_ms).unwrap_or(0)
            }
        };
        let completed = self.completed();
        self.tick
            .snapshot(completed, percent_done, elapsed, self.progress_tick)
    }
}
