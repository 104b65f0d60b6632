use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use super::latch::StopSignal;

/// Replenishment period of the constant-rate throttle.
pub const THROTTLE_TICK: Duration = Duration::from_millis(100);
const TICKS_PER_SECOND: u64 = 10;

/// Splits a per-second rate into per-tick permit grants.
///
/// The division remainder is carried between ticks so that any ten
/// consecutive ticks grant exactly `rate` permits.
#[derive(Debug, Clone)]
pub struct PermitSchedule {
    rate_per_sec: u64,
    remainder: u64,
}

impl PermitSchedule {
    #[must_use]
    pub const fn new(rate_per_sec: u64) -> Self {
        Self {
            rate_per_sec,
            remainder: 0,
        }
    }

    pub fn next_tick(&mut self) -> usize {
        let (base, rem) = div_mod_u64(self.rate_per_sec, TICKS_PER_SECOND);
        let (carry, new_rem) = div_mod_u64(self.remainder.saturating_add(rem), TICKS_PER_SECOND);
        self.remainder = new_rem;
        usize::try_from(base.saturating_add(carry)).unwrap_or(usize::MAX)
    }

    /// Upper bound on banked permits: one second of budget.
    #[must_use]
    pub fn burst_cap(&self) -> usize {
        usize::try_from(self.rate_per_sec.max(1)).unwrap_or(usize::MAX)
    }
}

/// Global constant-rate limiter shared by every worker.
#[derive(Debug)]
pub struct Throttle {
    permits: Arc<Semaphore>,
    rate: NonZeroU64,
    burst_cap: usize,
    tick: Duration,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Throttle {
    #[must_use]
    pub fn new(rate: NonZeroU64) -> Self {
        Self::with_tick(rate, THROTTLE_TICK)
    }

    #[must_use]
    pub fn with_tick(rate: NonZeroU64, tick: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            rate,
            burst_cap: PermitSchedule::new(rate.get()).burst_cap(),
            tick: tick.max(Duration::from_millis(1)),
            ticker: std::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn rate(&self) -> u64 {
        self.rate.get()
    }

    /// Starts granting permits. Calling it again is a no-op.
    pub fn start(&self) {
        let Ok(mut ticker) = self.ticker.lock() else {
            return;
        };
        if ticker.is_some() {
            return;
        }
        let permits = Arc::clone(&self.permits);
        let mut schedule = PermitSchedule::new(self.rate.get());
        let cap = self.burst_cap;
        let tick = self.tick;
        *ticker = Some(tokio::spawn(async move {
            let mut rate_tick = interval(tick);
            loop {
                rate_tick.tick().await;
                let grant = schedule.next_tick();
                let available = permits.available_permits();
                let room = cap.saturating_sub(available);
                permits.add_permits(grant.min(room));
            }
        }));
        debug!("Throttle started at {} requests/s", self.rate.get());
    }

    /// Waits for one permit. Returns `false` once `stop` fires.
    pub async fn acquire(&self, stop: &StopSignal) -> bool {
        if stop.is_fired() {
            return false;
        }
        tokio::select! {
            biased;
            () = stop.wait() => false,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    true
                }
                Err(_closed) => false,
            },
        }
    }

    /// Hands back a permit that was acquired but not spent, unless the bank
    /// already holds a full second of budget.
    pub fn restore(&self) {
        if self.permits.available_permits() < self.burst_cap {
            self.permits.add_permits(1);
        }
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.permits.close();
        if let Ok(mut ticker) = self.ticker.lock()
            && let Some(handle) = ticker.take()
        {
            handle.abort();
        }
    }
}

fn div_mod_u64(value: u64, divisor: u64) -> (u64, u64) {
    let div = value.checked_div(divisor).unwrap_or(0);
    let rem = value.checked_rem(divisor).unwrap_or(0);
    (div, rem)
}
