use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Payload validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Dialog error: {0}")]
    Dialog(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
