use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] noteseek_index::IndexError),

    #[error("search error: {0}")]
    Search(#[from] noteseek_search::SearchError),

    #[error("provider error: {0}")]
    Provider(#[from] noteseek_providers::ProviderError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid vault path: {0}")]
    InvalidPath(String),

    #[error("engine is shut down")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EngineError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for EngineError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}
