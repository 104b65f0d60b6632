use clap::Parser;
use std::time::Duration;

use super::parsers::{parse_duration_arg, parse_header, parse_positive_u64, parse_positive_usize};
use super::types::{HttpMethod, PhaseArgs, PositiveU64, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Async HTTP load generator - concurrent virtual users, optional constant request rate, per-second throughput and latency percentiles."
)]
pub struct CliArgs {
    /// Target URL (http or https)
    #[arg(long, short)]
    pub url: Option<String>,

    /// HTTP method to use
    #[arg(long, short = 'X', default_value = "get", ignore_case = true)]
    pub method: HttpMethod,

    /// HTTP headers in 'Key: Value' format (repeatable)
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(long, short)]
    pub data: Option<String>,

    /// Send the body with 'Content-Type: application/json'
    #[arg(long)]
    pub json: bool,

    /// Number of virtual users (concurrent workers)
    #[arg(long = "vu", short = 'c', alias = "concurrency", default_value = "1", value_parser = parse_positive_usize)]
    pub vu: PositiveUsize,

    /// Stop after this many requests
    #[arg(long = "requests", short = 'n', value_parser = parse_positive_u64, conflicts_with = "duration")]
    pub requests: Option<PositiveU64>,

    /// Stop after this long (supports ms/s/m/h)
    #[arg(long = "duration", short = 't', value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Hold a constant request rate (requests per second, across all virtual users)
    #[arg(long = "rate", short = 'r', value_parser = parse_positive_u64)]
    pub rate: Option<PositiveU64>,

    /// Per-request timeout (supports ms/s/m/h)
    #[arg(long = "timeout", default_value = "5s", value_parser = parse_duration_arg)]
    pub request_timeout: Duration,

    /// Timeout for establishing a new connection (supports ms/s/m/h)
    #[arg(long = "connect-timeout", default_value = "5s", value_parser = parse_duration_arg)]
    pub connect_timeout: Duration,

    /// Accept invalid TLS certificates and host names
    #[arg(long)]
    pub insecure: bool,

    /// Max idle connections kept per host
    #[arg(long = "pool-max-idle", value_parser = parse_positive_usize)]
    pub pool_max_idle_per_host: Option<PositiveUsize>,

    /// Do not send the default User-Agent header
    #[arg(long = "no-ua")]
    pub no_ua: bool,

    /// Path to config file (TOML/JSON/YAML). Defaults to ./volley.toml, ./volley.json or ./volley.yaml if present.
    #[arg(long)]
    pub config: Option<String>,

    /// Write every record to CSV
    #[arg(long = "export-csv")]
    pub export_csv: Option<String>,

    /// Write every record to JSON
    #[arg(long = "export-json")]
    pub export_json: Option<String>,

    /// Write a self-contained HTML latency/throughput report
    #[arg(long = "html-report")]
    pub html_report: Option<String>,

    /// Disable the per-second progress line
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Enable verbose logging (sets log level to debug unless overridden by VOLLEY_LOG/RUST_LOG)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable colored log output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Sequential phases; only settable from a config file
    #[arg(skip)]
    pub phases: Vec<PhaseArgs>,
}
