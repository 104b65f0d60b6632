pub(crate) const DEFAULT_USER_AGENT: &str = concat!("volley/", env!("CARGO_PKG_VERSION"));

/// Looked up in the working directory, in order, when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILES: [&str; 3] = ["volley.toml", "volley.json", "volley.yaml"];
