use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Queue depth below which a duration-bounded run refills the work queue.
pub const DEFAULT_WARNING_LIMIT: usize = 2_000;
/// Templates added per virtual user on each refill.
pub const TOPUP_PER_VU: usize = 4_000;
/// Growth applied to the refill size when breaches come in quick succession.
pub const ESCALATION_STEP: usize = 1_000;
/// Two breaches closer than this escalate the refill size.
pub const ESCALATION_WINDOW: Duration = Duration::from_secs(1);

/// Keeps a duration-bounded run from starving its workers.
#[derive(Debug, Clone)]
pub struct TopupPolicy {
    warning_limit: usize,
    topup_amount: usize,
    escalation_step: usize,
    escalation_window: Duration,
    last_breach: Option<Instant>,
    escalations: u64,
}

impl TopupPolicy {
    #[must_use]
    pub const fn for_virtual_users(vu: NonZeroUsize) -> Self {
        Self::with_limits(
            DEFAULT_WARNING_LIMIT,
            TOPUP_PER_VU.saturating_mul(vu.get()),
            ESCALATION_STEP,
            ESCALATION_WINDOW,
        )
    }

    #[must_use]
    pub const fn with_limits(
        warning_limit: usize,
        topup_amount: usize,
        escalation_step: usize,
        escalation_window: Duration,
    ) -> Self {
        Self {
            warning_limit,
            topup_amount,
            escalation_step,
            escalation_window,
            last_breach: None,
            escalations: 0,
        }
    }

    #[must_use]
    pub const fn topup_amount(&self) -> usize {
        self.topup_amount
    }

    #[must_use]
    pub const fn escalations(&self) -> u64 {
        self.escalations
    }

    /// Returns how many templates to enqueue, if the depth is under the
    /// watermark.
    pub fn check(&mut self, depth: usize, now: Instant) -> Option<usize> {
        if depth >= self.warning_limit {
            return None;
        }
        if let Some(last) = self.last_breach
            && now.saturating_duration_since(last) <= self.escalation_window
        {
            self.topup_amount = self.topup_amount.saturating_add(self.escalation_step);
            self.escalations = self.escalations.saturating_add(1);
            warn!(
                "Request queue ran low twice within {}ms (below {}); refill size raised to {}.",
                self.escalation_window.as_millis(),
                self.warning_limit,
                self.topup_amount
            );
        }
        self.last_breach = Some(now);
        Some(self.topup_amount)
    }
}
