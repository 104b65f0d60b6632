use std::time::Duration;

use serde::Deserialize;

use crate::args::HttpMethod;
use crate::args::parsers::parse_duration_value;
use crate::error::ValidationError;

/// Every key is optional; values set on the command line win.
///
/// Besides the flat keys, the YAML `settings` / `scenarios` layout is
/// accepted: the endpoint is `settings.target` joined with the first flow
/// step's url.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Vec<String>>,
    pub data: Option<String>,
    pub json: Option<bool>,
    #[serde(alias = "concurrency")]
    pub vu: Option<usize>,
    pub requests: Option<u64>,
    pub duration: Option<DurationValue>,
    pub rate: Option<u64>,
    pub timeout: Option<DurationValue>,
    pub connect_timeout: Option<DurationValue>,
    pub insecure: Option<bool>,
    pub pool_max_idle: Option<usize>,
    pub no_ua: Option<bool>,
    pub export_csv: Option<String>,
    pub export_json: Option<String>,
    pub html_report: Option<String>,
    pub no_progress: Option<bool>,
    pub no_color: Option<bool>,
    pub verbose: Option<bool>,
    pub phases: Option<Vec<PhaseConfig>>,
    pub settings: Option<SettingsSection>,
    pub scenarios: Option<Vec<ScenarioConfig>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsSection {
    pub target: Option<String>,
    /// `html` turns on the HTML report with a default file name.
    pub report: Option<String>,
    pub phases: Option<Vec<PhaseConfig>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScenarioConfig {
    pub name: Option<String>,
    pub flow: Option<Vec<FlowStep>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowStep {
    pub get: Option<FlowRequest>,
    pub post: Option<FlowRequest>,
    pub put: Option<FlowRequest>,
    pub patch: Option<FlowRequest>,
    pub delete: Option<FlowRequest>,
}

impl FlowStep {
    pub(crate) fn request(&self) -> Option<(HttpMethod, &FlowRequest)> {
        [
            (HttpMethod::Get, self.get.as_ref()),
            (HttpMethod::Post, self.post.as_ref()),
            (HttpMethod::Put, self.put.as_ref()),
            (HttpMethod::Patch, self.patch.as_ref()),
            (HttpMethod::Delete, self.delete.as_ref()),
        ]
        .into_iter()
        .find_map(|(method, request)| request.map(|request| (method, request)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowRequest {
    pub url: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhaseConfig {
    pub name: Option<String>,
    #[serde(alias = "concurrency")]
    pub vu: Option<usize>,
    pub requests: Option<u64>,
    pub duration: Option<DurationValue>,
    #[serde(alias = "arrivalRate", alias = "arrival_rate")]
    pub rate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ValidationError> {
        match self {
            DurationValue::Seconds(0) => Err(ValidationError::DurationZero),
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration_value(text),
        }
    }
}
