use std::path::PathBuf;

use thiserror::Error;

use super::ValidationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse YAML config '{path}': {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml, .json, .yaml or .yml.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have a .toml, .json, .yaml or .yml extension.")]
    MissingExtension,
    #[error("Missing target URL (set --url or provide one in a config file).")]
    MissingTarget,
    #[error("Invalid target URL '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Target URL '{url}' must use http or https.")]
    UnsupportedScheme { url: String },
    #[error("Set exactly one of max requests or duration, not both.")]
    ConflictingStopConditions,
    #[error("Missing stop condition: set either max requests or duration.")]
    MissingStopCondition,
    #[error("Max requests must be >= 1.")]
    ZeroRequests,
    #[error("Virtual user count must be >= 1.")]
    ZeroVirtualUsers,
    #[error("Constant rate must be >= 1 request per second.")]
    ZeroRate,
    #[error("Per-request timeout must be > 0.")]
    ZeroTimeout,
    #[error("Duration must be > 0.")]
    ZeroDuration,
    #[error("Phase {index} ('{name}') is invalid: {source}")]
    InvalidPhase {
        index: usize,
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("Invalid header: {source}")]
    InvalidHeader {
        #[source]
        source: ValidationError,
    },
    #[error("Invalid duration in config: {source}")]
    InvalidDuration {
        #[source]
        source: ValidationError,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
