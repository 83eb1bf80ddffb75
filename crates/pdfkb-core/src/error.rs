use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate chunk id: {0}")]
    DuplicateId(String),

    #[error("No text extracted from {0}")]
    EmptyDocument(String),

    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self { Self::InvalidConfig(message.into()) }

    pub fn extraction(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction { path: path.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
