use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    /// Vector and hybrid queries need the embedding provider; the caller
    /// may retry in fulltext mode
    #[error("embedding provider error: {0}")]
    Embedding(#[from] noteseek_providers::ProviderError),
}
