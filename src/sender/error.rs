use thiserror::Error;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Unauthorized request to {url}")]
    Unauthorized { url: String },
    #[error("Resource not found: {url}")]
    NotFound { url: String, body: String },
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("HTTP error: {status} from {url} - {body}")]
    Http { status: u16, url: String, body: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SendError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SendError::NotFound { .. })
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SendError::Unauthorized { .. } => Some(401),
            SendError::NotFound { .. } => Some(404),
            SendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
