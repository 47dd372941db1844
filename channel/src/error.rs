use thiserror::Error;

/// Connection-level failures. These are never returned from the event loop;
/// they are dispatched as `connect_error` and kept on the channel.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("invalid channel endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
    #[error("Connection error: {message}")]
    ConnectFailed { message: String },
    #[error("server rejected the connection: {message}")]
    Rejected { message: String },
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ConnectivityError {
    pub(crate) fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// True for the error that ends a channel's retry loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint { .. } | Self::RetriesExhausted { .. }
        )
    }
}
