use agentfield_protocol::{DecodeError, ErrorShape};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The gateway refused the handshake (bad credential, protocol mismatch).
    /// Fatal for the attempt; never retried automatically.
    #[error("handshake rejected ({code}): {message}")]
    HandshakeRejected { code: String, message: String },

    #[error("`{method}` timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// The gateway answered the request with `ok: false`.
    #[error("remote error ({code}): {message}")]
    Remote {
        code: String,
        message: String,
        data: Option<serde_json::Value>,
        retryable: bool,
    },

    #[error("not connected")]
    NotConnected,

    #[error("request of {len} bytes exceeds the negotiated {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] agentfield_config::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    #[must_use]
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Whether a caller may reasonably retry the same call. Retrying a
    /// non-idempotent call after `Timeout` is only safe with an idempotency key.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionLost { .. } | Self::NotConnected => true,
            Self::Remote { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Error code for remote and handshake failures.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } | Self::HandshakeRejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<ErrorShape> for Error {
    fn from(shape: ErrorShape) -> Self {
        Self::Remote {
            code: shape.code,
            message: shape.message,
            data: shape.data,
            retryable: shape.retryable.unwrap_or(false),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
