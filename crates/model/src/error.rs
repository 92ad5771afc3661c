use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not reach the model provider, or the connection
    /// broke before a response was received.
    Transport,
    /// The model provider is rate limited.
    RateLimited,
    /// The provider rejected the request (schema, auth, etc.).
    InvalidRequest,
    /// The response body could not be understood.
    MalformedResponse,
}

impl ErrorKind {
    /// Returns `true` if a request failed with this kind may succeed when
    /// sent again later.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::RateLimited)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::RateLimited => write!(f, "Rate limited"),
            ErrorKind::InvalidRequest => write!(f, "Invalid request"),
            ErrorKind::MalformedResponse => write!(f, "Malformed response"),
        }
    }
}
