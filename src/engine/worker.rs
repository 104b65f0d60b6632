use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error};

use super::latch::{StartGate, StopSignal};
use super::queue::{DequeueHandle, ResultSender};
use super::record::{RequestStatus, ResultRecord};
use super::template::RequestTemplate;
use super::throttle::Throttle;
use super::transport::{SendOutcome, Transport};

const IDLE_BACKOFF_MIN: Duration = Duration::from_millis(1);
const IDLE_BACKOFF_MAX: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Stopped,
    Faulted,
    ResultsClosed,
}

pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) queue: DequeueHandle,
    pub(crate) results: ResultSender,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) throttle: Option<Arc<Throttle>>,
    pub(crate) start: StartGate,
    pub(crate) stop: StopSignal,
    pub(crate) request_timeout: Duration,
    pub(crate) exited: Arc<AtomicUsize>,
}

/// Body of one virtual user.
///
/// Every template taken off the queue produces exactly one record, including
/// when the transport panics; in that case the worker records the fault and
/// leaves the pool.
pub(crate) async fn run_worker(ctx: WorkerContext) -> WorkerExit {
    ctx.start.wait().await;
    let exit = worker_loop(&ctx).await;
    ctx.exited.fetch_add(1, Ordering::AcqRel);
    debug!("Worker {} exited: {:?}", ctx.id, exit);
    exit
}

async fn worker_loop(ctx: &WorkerContext) -> WorkerExit {
    let mut idle_polls: u32 = 0;
    loop {
        if ctx.stop.is_fired() {
            return WorkerExit::Stopped;
        }

        if let Some(throttle) = ctx.throttle.as_deref()
            && !throttle.acquire(&ctx.stop).await
        {
            return WorkerExit::Stopped;
        }

        // Stop may have fired while waiting for a permit.
        let next = if ctx.stop.is_fired() {
            None
        } else {
            ctx.queue.try_dequeue()
        };
        let Some(template) = next else {
            if let Some(throttle) = ctx.throttle.as_deref() {
                throttle.restore();
            }
            if ctx.stop.is_fired() {
                return WorkerExit::Stopped;
            }
            idle_polls = idle_polls.saturating_add(1);
            tokio::select! {
                biased;
                () = ctx.stop.wait() => {}
                () = sleep(idle_backoff(idle_polls)) => {}
            }
            continue;
        };
        idle_polls = 0;

        let (record, faulted) = execute(ctx, template).await;
        if !ctx.results.push(record) {
            return WorkerExit::ResultsClosed;
        }
        if faulted {
            return WorkerExit::Faulted;
        }
    }
}

async fn execute(ctx: &WorkerContext, template: RequestTemplate) -> (ResultRecord, bool) {
    let seq = template.seq();
    let start_time = Instant::now();
    let attempt = AssertUnwindSafe(timeout(
        ctx.request_timeout,
        ctx.transport.send(&template, ctx.request_timeout),
    ))
    .catch_unwind()
    .await;
    let end_time = Instant::now();

    let (status, message, faulted) = match attempt {
        Ok(Ok(SendOutcome::Response { status })) => (RequestStatus::Http(status), None, false),
        Ok(Ok(SendOutcome::TimedOut) | Err(_)) => (
            RequestStatus::Timeout,
            Some(format!(
                "request timed out after {}ms",
                ctx.request_timeout.as_millis()
            )),
            false,
        ),
        Ok(Ok(SendOutcome::Failed { message })) => (RequestStatus::Transport, Some(message), false),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Worker {} faulted while sending request {}: {}", ctx.id, seq, message);
            (
                RequestStatus::Transport,
                Some(format!("worker fault: {message}")),
                true,
            )
        }
    };

    (
        ResultRecord::new(seq, start_time, end_time, status, message),
        faulted,
    )
}

fn idle_backoff(idle_polls: u32) -> Duration {
    let shift = idle_polls.min(5);
    IDLE_BACKOFF_MIN
        .saturating_mul(1_u32.checked_shl(shift).unwrap_or(1))
        .min(IDLE_BACKOFF_MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}
