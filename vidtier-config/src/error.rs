use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {origin}: {source}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse config {origin}: toml error: {toml}; json error: {json}")]
    Unrecognized {
        origin: String,
        toml: String,
        json: String,
    },
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
