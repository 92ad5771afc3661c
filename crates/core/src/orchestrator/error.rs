use std::fmt::{self, Display};

use iai_model::{ErrorKind as ModelErrorKind, Usage};

use crate::conversation::ToolInvocation;
use crate::store::StoreError;

/// The kind of a failed turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnErrorKind {
    /// The user input can't start a turn, e.g. it's blank.
    InvalidInput,
    /// The model stayed unreachable (or rate limited) after all retries.
    UpstreamUnavailable,
    /// The model provider rejected the request.
    InvalidRequest,
    /// The model provider returned something that couldn't be understood.
    MalformedResponse,
    /// The store failed to persist or load a message.
    Storage,
    /// The conversation doesn't exist.
    ConversationNotFound,
    /// The caller cancelled the turn.
    Cancelled,
}

impl Display for TurnErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnErrorKind::InvalidInput => write!(f, "Invalid input"),
            TurnErrorKind::UpstreamUnavailable => {
                write!(f, "Upstream unavailable")
            }
            TurnErrorKind::InvalidRequest => write!(f, "Invalid request"),
            TurnErrorKind::MalformedResponse => write!(f, "Malformed response"),
            TurnErrorKind::Storage => write!(f, "Storage error"),
            TurnErrorKind::ConversationNotFound => {
                write!(f, "Conversation not found")
            }
            TurnErrorKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<ModelErrorKind> for TurnErrorKind {
    fn from(value: ModelErrorKind) -> Self {
        match value {
            ModelErrorKind::Transport | ModelErrorKind::RateLimited => {
                TurnErrorKind::UpstreamUnavailable
            }
            ModelErrorKind::InvalidRequest => TurnErrorKind::InvalidRequest,
            ModelErrorKind::MalformedResponse => {
                TurnErrorKind::MalformedResponse
            }
        }
    }
}

impl From<&StoreError> for TurnErrorKind {
    fn from(value: &StoreError) -> Self {
        match value {
            StoreError::ConversationNotFound(_) => {
                TurnErrorKind::ConversationNotFound
            }
            _ => TurnErrorKind::Storage,
        }
    }
}

/// Describes a failed turn.
///
/// Everything that happened before the failure stays persisted, and the
/// error carries the usage and tool invocations accumulated so far.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TurnError {
    kind: TurnErrorKind,
    message: String,
    usage: Usage,
    tool_invocations: Vec<ToolInvocation>,
}

impl TurnError {
    pub(crate) fn new(
        kind: TurnErrorKind,
        message: String,
        usage: Usage,
        tool_invocations: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            kind,
            message,
            usage,
            tool_invocations,
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> TurnErrorKind {
        self.kind
    }

    /// Returns the detailed error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the usage of the model calls made before the failure.
    #[inline]
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Returns the tool invocations made before the failure.
    #[inline]
    pub fn tool_invocations(&self) -> &[ToolInvocation] {
        &self.tool_invocations
    }
}
