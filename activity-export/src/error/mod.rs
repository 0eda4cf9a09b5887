use thiserror::Error;

/// Errors raised while talking to the upstream REST API.
///
/// These never escape a single request: callers that don't want to tell
/// failure apart from "no data" go through `ApiClient::get`, which logs and
/// degrades to an empty payload.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("response from {url} is not valid json: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by a sink while persisting rows.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("insert into {table} failed: {source}")]
    Database {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Startup errors. These are the only fatal ones.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {name} timestamp {value:?}: {source}")]
    InvalidTimestamp {
        name: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),
    #[error("access token is not a valid header value")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
