//! Error types surfaced by the library.
use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the Keyword API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}: {text}")]
    UnexpectedStatus { status: StatusCode, text: String },
    #[error("request rejected by the keyword API: {0}")]
    Rejected(String),
}

/// Failures reading or writing persisted state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed value under {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
