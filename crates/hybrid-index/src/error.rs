use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding dimension mismatch: index declares {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("snapshot was built for model '{snapshot}' but '{configured}' is configured")]
    ModelMismatch { snapshot: String, configured: String },

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("expected {expected} embeddings for document, got {got}")]
    EmbeddingCountMismatch { expected: usize, got: usize },
}
