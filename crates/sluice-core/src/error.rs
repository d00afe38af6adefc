//! Error types shared across Sluice components.

use std::time::Duration;

use crate::framing::FrameError;

/// Sluice error type
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    /// The endpoint answered with a non-success HTTP status
    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A response body could not be decoded as the expected payload
    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Request cancelled")]
    Cancelled,

    /// The client was configured with an unusable value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SluiceError {
    /// Whether the error came from the network rather than the server's answer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<FrameError> for SluiceError {
    fn from(err: FrameError) -> Self {
        Self::Framing(err.to_string())
    }
}
