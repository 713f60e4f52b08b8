use thiserror::Error;

/// Synthetic status attached to failures where no response was obtained.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

#[derive(Debug, Error)]
/// Failure taxonomy for outbound JSON API calls.
pub enum ApiError {
    /// DNS/connection-level failure before any response arrived.
    #[error("transport failure (status {status}): {message}")]
    Transport { status: u16, message: String },
    /// The API answered with a non-200 status; carries the raw body.
    #[error("api responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Client could not be constructed from the supplied configuration.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: TRANSPORT_FAILURE_STATUS,
            message: message.into(),
        }
    }

    /// Status code carried by network failures; `None` for local errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::InvalidConfig(_) | Self::Serde(_) => None,
        }
    }
}
