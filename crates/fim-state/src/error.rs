use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
