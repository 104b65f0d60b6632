use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{CliArgs, PhaseArgs, PositiveU64, PositiveUsize, parse_header};
use crate::error::{AppError, AppResult, ConfigError};

use super::types::{ConfigFile, DurationValue, PhaseConfig};

const DEFAULT_HTML_REPORT: &str = "volley-report.html";

/// Applies configuration values to CLI arguments.
///
/// # Errors
///
/// Returns an error when config values are invalid.
pub fn apply_config(
    args: &mut CliArgs,
    matches: &ArgMatches,
    config: &ConfigFile,
) -> AppResult<()> {
    let flow = config
        .scenarios
        .as_ref()
        .and_then(|scenarios| scenarios.first())
        .and_then(|scenario| scenario.flow.as_ref())
        .and_then(|flow| flow.first())
        .and_then(|step| step.request());

    if !is_cli(matches, "url")
        && let Some(url) = resolve_endpoint(config)
    {
        args.url = Some(url);
    }

    if !is_cli(matches, "method") {
        if let Some(method) = config.method {
            args.method = method;
        } else if let Some((method, _)) = flow {
            args.method = method;
        }
    }

    if !is_cli(matches, "headers")
        && let Some(headers) = config.headers.as_ref()
    {
        args.headers = parse_headers(headers)?;
    }

    if !is_cli(matches, "data") {
        if let Some(data) = config.data.clone() {
            args.data = Some(data);
        } else if let Some(body) = flow.and_then(|(_, request)| request.body.clone()) {
            args.data = Some(body);
        }
    }

    apply_flag(matches, "json", config.json, &mut args.json);

    if !is_cli(matches, "vu")
        && let Some(vu) = config.vu
    {
        args.vu = PositiveUsize::try_from(vu)
            .map_err(|_zero| AppError::config(ConfigError::ZeroVirtualUsers))?;
    }

    // A stop condition given on the command line replaces the config's pair.
    if !is_cli(matches, "requests") && !is_cli(matches, "duration") {
        if let Some(requests) = config.requests {
            args.requests = Some(
                PositiveU64::try_from(requests)
                    .map_err(|_zero| AppError::config(ConfigError::ZeroRequests))?,
            );
        }
        if let Some(duration) = config.duration.as_ref() {
            args.duration = Some(to_duration(duration)?);
        }
    }

    if !is_cli(matches, "rate")
        && let Some(rate) = config.rate
    {
        args.rate = Some(
            PositiveU64::try_from(rate).map_err(|_zero| AppError::config(ConfigError::ZeroRate))?,
        );
    }

    if !is_cli(matches, "request_timeout")
        && let Some(timeout) = config.timeout.as_ref()
    {
        args.request_timeout = to_duration(timeout)?;
    }

    if !is_cli(matches, "connect_timeout")
        && let Some(timeout) = config.connect_timeout.as_ref()
    {
        args.connect_timeout = to_duration(timeout)?;
    }

    if !is_cli(matches, "pool_max_idle_per_host")
        && let Some(max_idle) = config.pool_max_idle
    {
        args.pool_max_idle_per_host = Some(PositiveUsize::try_from(max_idle)?);
    }

    apply_flag(matches, "insecure", config.insecure, &mut args.insecure);
    apply_flag(matches, "no_ua", config.no_ua, &mut args.no_ua);
    apply_flag(matches, "no_progress", config.no_progress, &mut args.no_progress);
    apply_flag(matches, "no_color", config.no_color, &mut args.no_color);
    apply_flag(matches, "verbose", config.verbose, &mut args.verbose);

    apply_path(matches, "export_csv", config.export_csv.as_ref(), &mut args.export_csv);
    apply_path(matches, "export_json", config.export_json.as_ref(), &mut args.export_json);
    apply_path(matches, "html_report", config.html_report.as_ref(), &mut args.html_report);
    if args.html_report.is_none()
        && config
            .settings
            .as_ref()
            .and_then(|settings| settings.report.as_deref())
            .is_some_and(|report| report.eq_ignore_ascii_case("html"))
    {
        args.html_report = Some(DEFAULT_HTML_REPORT.to_owned());
    }

    let phases = config.phases.as_ref().or_else(|| {
        config
            .settings
            .as_ref()
            .and_then(|settings| settings.phases.as_ref())
    });
    if let Some(phases) = phases {
        args.phases = parse_phases(phases)?;
    }

    Ok(())
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(ValueSource::CommandLine)
}

fn apply_flag(matches: &ArgMatches, name: &str, value: Option<bool>, target: &mut bool) {
    if !is_cli(matches, name)
        && let Some(value) = value
    {
        *target = value;
    }
}

fn apply_path(
    matches: &ArgMatches,
    name: &str,
    value: Option<&String>,
    target: &mut Option<String>,
) {
    if !is_cli(matches, name)
        && let Some(value) = value
    {
        *target = Some(value.clone());
    }
}

/// `url` wins; otherwise `settings.target` + the first flow step's url.
fn resolve_endpoint(config: &ConfigFile) -> Option<String> {
    if let Some(url) = config.url.clone() {
        return Some(url);
    }
    let target = config
        .settings
        .as_ref()
        .and_then(|settings| settings.target.as_deref())?;
    let path = config
        .scenarios
        .as_ref()
        .and_then(|scenarios| scenarios.first())
        .and_then(|scenario| scenario.flow.as_ref())
        .and_then(|flow| flow.first())
        .and_then(|step| step.request())
        .and_then(|(_, request)| request.url.as_deref())
        .unwrap_or_default();
    Some(format!("{target}{path}"))
}

fn to_duration(value: &DurationValue) -> AppResult<std::time::Duration> {
    value
        .to_duration()
        .map_err(|err| AppError::config(ConfigError::InvalidDuration { source: err }))
}

fn parse_headers(headers: &[String]) -> AppResult<Vec<(String, String)>> {
    let mut parsed = Vec::with_capacity(headers.len());
    for header in headers {
        parsed.push(
            parse_header(header)
                .map_err(|err| AppError::config(ConfigError::InvalidHeader { source: err }))?,
        );
    }
    Ok(parsed)
}

fn parse_phases(phases: &[PhaseConfig]) -> AppResult<Vec<PhaseArgs>> {
    let mut parsed = Vec::with_capacity(phases.len());
    for (index, phase) in phases.iter().enumerate() {
        let name = phase
            .name
            .clone()
            .unwrap_or_else(|| format!("phase-{}", index.saturating_add(1)));
        let phase_args = parse_phase(phase, name.clone()).map_err(|source| {
            AppError::config(ConfigError::InvalidPhase {
                index,
                name,
                source: Box::new(source),
            })
        })?;
        parsed.push(phase_args);
    }
    Ok(parsed)
}

fn parse_phase(phase: &PhaseConfig, name: String) -> Result<PhaseArgs, ConfigError> {
    let duration = match phase.duration.as_ref() {
        Some(value) => Some(
            value
                .to_duration()
                .map_err(|source| ConfigError::InvalidDuration { source })?,
        ),
        None => None,
    };
    let requests = match phase.requests {
        Some(requests) => {
            Some(PositiveU64::try_from(requests).map_err(|_zero| ConfigError::ZeroRequests)?)
        }
        None => None,
    };
    match (requests.is_some(), duration.is_some()) {
        (true, true) => return Err(ConfigError::ConflictingStopConditions),
        (false, false) => return Err(ConfigError::MissingStopCondition),
        (true, false) | (false, true) => {}
    }
    let vu = match phase.vu {
        Some(vu) => {
            Some(PositiveUsize::try_from(vu).map_err(|_zero| ConfigError::ZeroVirtualUsers)?)
        }
        None => None,
    };
    let rate = match phase.rate {
        Some(rate) => Some(PositiveU64::try_from(rate).map_err(|_zero| ConfigError::ZeroRate)?),
        None => None,
    };
    Ok(PhaseArgs {
        name,
        vu,
        requests,
        duration,
        rate,
    })
}

