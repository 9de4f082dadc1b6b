use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// True when a retry on a later cycle could plausibly succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) | Self::Json(_) => false,
        }
    }
}
