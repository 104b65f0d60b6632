//! Load-generation engine.
//!
//! A run is driven by [`Manager`]: it seeds the [`WorkQueue`] with request
//! templates, releases a pool of workers through the start gate, collects
//! every [`ResultRecord`] they push, and finally hands the full record store
//! to [`analytics`] once every worker has exited.

pub mod analytics;
mod latch;
mod manager;
mod progress;
mod queue;
mod record;
mod settings;
mod template;
mod throttle;
mod topup;
mod transport;
mod worker;

#[cfg(test)]
mod tests;

pub use analytics::{PercentileRow, PercentileTable, Summary};
pub use latch::{Latch, StartGate, StopSignal};
pub use manager::{Manager, RunReport, RunState, StopHandle, StopReason};
pub use progress::{Progress, ProgressHandle};
pub use queue::{DequeueHandle, WorkQueue};
pub use record::{RequestStatus, ResultRecord, TIMEOUT_STATUS_CODE, TRANSPORT_STATUS_CODE};
pub use settings::{DEFAULT_REQUEST_TIMEOUT, Settings, SettingsBuilder, StopCondition};
pub use template::{RequestSpec, RequestTemplate, TemplateFactory};
pub use throttle::{PermitSchedule, THROTTLE_TICK, Throttle};
pub use topup::TopupPolicy;
pub use transport::{HttpTransport, SendOutcome, Transport, TransportOptions};
