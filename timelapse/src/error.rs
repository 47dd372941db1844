use thiserror::Error;

pub(crate) const GENERIC_FETCH_FAILURE: &str = "Failed to fetch timelapse data";

#[derive(Debug, Error)]
pub enum DataFetchError {
    /// Non-200 reply; `message` is the server's `error` field when present.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("timelapse request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid timelapse response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid timelapse query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("month index {0} is outside 0..=11")]
    InvalidMonth(u8),
}
