use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::args::HttpMethod;
use crate::error::ConfigError;

use super::template::RequestSpec;

/// Per-request deadline applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Exactly one bound ends a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    MaxRequests(NonZeroU64),
    Duration(Duration),
}

impl StopCondition {
    #[must_use]
    pub const fn is_duration_bounded(&self) -> bool {
        matches!(self, Self::Duration(_))
    }

    #[must_use]
    pub const fn max_requests(&self) -> Option<u64> {
        match self {
            Self::MaxRequests(limit) => Some(limit.get()),
            Self::Duration(_) => None,
        }
    }
}

impl std::fmt::Display for StopCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxRequests(limit) => write!(f, "{} requests", limit.get()),
            Self::Duration(duration) => write!(f, "{}ms", duration.as_millis()),
        }
    }
}

/// Validated, immutable run configuration.
///
/// Only [`SettingsBuilder::build`] produces one, so a `Settings` value always
/// carries a single stop condition, a positive virtual-user count and a
/// parseable http(s) target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target: Url,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub vu: NonZeroUsize,
    pub stop: StopCondition,
    pub constant_rps: Option<NonZeroU64>,
    pub request_timeout: Duration,
    pub phase: Option<Arc<str>>,
}

impl Settings {
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Re-checks the invariants that public field access could break.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scheme(&self.target)?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if let StopCondition::Duration(duration) = self.stop
            && duration.is_zero()
        {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    #[must_use]
    pub fn request_spec(&self) -> RequestSpec {
        RequestSpec {
            method: self.method,
            url: self.target.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    target: Option<String>,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    body: Option<String>,
    vu: Option<usize>,
    max_requests: Option<u64>,
    duration: Option<Duration>,
    constant_rps: Option<u64>,
    request_timeout: Option<Duration>,
    phase: Option<String>,
}

impl SettingsBuilder {
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub const fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub const fn vu(mut self, vu: usize) -> Self {
        self.vu = Some(vu);
        self
    }

    #[must_use]
    pub const fn max_requests(mut self, max_requests: Option<u64>) -> Self {
        self.max_requests = max_requests;
        self
    }

    #[must_use]
    pub const fn duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub const fn constant_rps(mut self, rate: Option<u64>) -> Self {
        self.constant_rps = rate;
        self
    }

    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn phase(mut self, phase: Option<String>) -> Self {
        self.phase = phase;
        self
    }

    /// Validates the collected values.
    ///
    /// # Errors
    ///
    /// Fails when the target is missing or not an http(s) URL, when both or
    /// neither stop conditions are set, or when a count, rate or timeout is
    /// zero.
    pub fn build(self) -> Result<Settings, ConfigError> {
        let raw_target = self.target.ok_or(ConfigError::MissingTarget)?;
        let target = Url::parse(raw_target.trim()).map_err(|source| ConfigError::InvalidTarget {
            url: raw_target.clone(),
            source,
        })?;
        check_scheme(&target)?;

        let stop = match (self.max_requests, self.duration) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingStopConditions),
            (None, None) => return Err(ConfigError::MissingStopCondition),
            (Some(limit), None) => {
                StopCondition::MaxRequests(NonZeroU64::new(limit).ok_or(ConfigError::ZeroRequests)?)
            }
            (None, Some(duration)) => {
                if duration.is_zero() {
                    return Err(ConfigError::ZeroDuration);
                }
                StopCondition::Duration(duration)
            }
        };

        let vu = NonZeroUsize::new(self.vu.unwrap_or(1)).ok_or(ConfigError::ZeroVirtualUsers)?;

        let constant_rps = match self.constant_rps {
            Some(rate) => Some(NonZeroU64::new(rate).ok_or(ConfigError::ZeroRate)?),
            None => None,
        };

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(Settings {
            target,
            method: self.method,
            headers: self.headers,
            body: self.body,
            vu,
            stop,
            constant_rps,
            request_timeout,
            phase: self.phase.map(Arc::from),
        })
    }
}

fn check_scheme(url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        _ => Err(ConfigError::UnsupportedScheme {
            url: url.to_string(),
        }),
    }
}
