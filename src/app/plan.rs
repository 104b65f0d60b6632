use crate::args::{CliArgs, DEFAULT_USER_AGENT, PhaseArgs};
use crate::engine::{HttpTransport, Settings, SettingsBuilder, TransportOptions};
use crate::error::{AppError, AppResult, ConfigError};

const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Where the finished reports go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReportTargets {
    pub(crate) csv: Option<String>,
    pub(crate) json: Option<String>,
    pub(crate) html: Option<String>,
}

impl ReportTargets {
    pub(crate) const fn any(&self) -> bool {
        self.csv.is_some() || self.json.is_some() || self.html.is_some()
    }
}

/// A validated run: one entry per phase, executed in order.
#[derive(Debug, Clone)]
pub(crate) struct RunPlan {
    pub(crate) phases: Vec<Settings>,
    pub(crate) transport: TransportOptions,
    pub(crate) reports: ReportTargets,
    pub(crate) show_progress: bool,
    pub(crate) no_color: bool,
}

pub(crate) fn build_plan(args: &CliArgs) -> AppResult<RunPlan> {
    let headers = request_headers(args);
    HttpTransport::validate_headers(&headers)?;

    let phases = if args.phases.is_empty() {
        vec![
            base_builder(args, headers)
                .vu(args.vu.get())
                .max_requests(args.requests.map(|value| value.get()))
                .duration(args.duration)
                .constant_rps(args.rate.map(|value| value.get()))
                .build()?,
        ]
    } else {
        args.phases
            .iter()
            .enumerate()
            .map(|(index, phase)| phase_settings(args, &headers, index, phase))
            .collect::<AppResult<Vec<_>>>()?
    };

    Ok(RunPlan {
        phases,
        transport: TransportOptions {
            connect_timeout: args.connect_timeout,
            insecure: args.insecure,
            pool_max_idle_per_host: args.pool_max_idle_per_host.map(|value| value.get()),
            user_agent: (!args.no_ua).then(|| DEFAULT_USER_AGENT.to_owned()),
        },
        reports: ReportTargets {
            csv: args.export_csv.clone(),
            json: args.export_json.clone(),
            html: args.html_report.clone(),
        },
        show_progress: !args.no_progress,
        no_color: args.no_color,
    })
}

fn phase_settings(
    args: &CliArgs,
    headers: &[(String, String)],
    index: usize,
    phase: &PhaseArgs,
) -> AppResult<Settings> {
    base_builder(args, headers.to_vec())
        .vu(phase.vu.unwrap_or(args.vu).get())
        .max_requests(phase.requests.map(|value| value.get()))
        .duration(phase.duration)
        .constant_rps(phase.rate.or(args.rate).map(|value| value.get()))
        .phase(Some(phase.name.clone()))
        .build()
        .map_err(|source| {
            AppError::config(ConfigError::InvalidPhase {
                index,
                name: phase.name.clone(),
                source: Box::new(source),
            })
        })
}

fn base_builder(args: &CliArgs, headers: Vec<(String, String)>) -> SettingsBuilder {
    let builder = Settings::builder()
        .method(args.method)
        .headers(headers)
        .body(args.data.clone())
        .request_timeout(args.request_timeout);
    match args.url.as_deref() {
        Some(url) => builder.target(url),
        None => builder,
    }
}

fn request_headers(args: &CliArgs) -> Vec<(String, String)> {
    let mut headers = args.headers.clone();
    let has_content_type = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE));
    if args.json && !has_content_type {
        headers.push((CONTENT_TYPE.to_owned(), JSON_CONTENT_TYPE.to_owned()));
    }
    headers
}
