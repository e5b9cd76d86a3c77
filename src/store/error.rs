use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Field test not found: {0}")]
    NotFound(String),
    #[error("Field test already ended: {0}")]
    AlreadyEnded(String),
    #[error("Invalid id: {0:?}")]
    InvalidId(String),
}
