//! Pipeline error types

use thiserror::Error;

/// Failures that end one scrape. The next tick retries.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Reading response body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Corrupt metric family framing: {0}")]
    Framing(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Scrape decoder stopped unexpectedly")]
    DecoderStopped,
}

/// A malformed metric family. Only that family is skipped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid metric family frame: {0}")]
    Frame(#[from] prost::DecodeError),

    #[error("Invalid text exposition for '{family}' at line {line}: {reason}")]
    Family {
        family: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid text exposition at line {line}: {reason}")]
    Line { line: usize, reason: String },
}

/// Item-level error produced by the scrape stream
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A batch the provider did not accept. Only that batch is lost.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("PutMetricData to namespace '{namespace}' failed: {message}")]
    Rejected { namespace: String, message: String },
}
