use thiserror::Error;

/// Top-level error type for the forwarding pipeline.
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Send error: {0}")]
    Send(#[from] crate::sender::SendError),
}
