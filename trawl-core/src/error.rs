use thiserror::Error;
use trawl_scanner::ScanError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Archive error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// The `--start-at` hint carried by an aborted traversal, if any.
    pub fn resume_point(&self) -> Option<&trawl_scanner::ResumePoint> {
        match self {
            CoreError::Scan(e) => e.resume_point(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
