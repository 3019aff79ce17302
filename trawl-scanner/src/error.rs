use std::fmt;
use thiserror::Error;

/// Where an aborted traversal can be picked up again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub node: String,
    pub context: String,
}

impl fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "you can continue from where you left off with --start-at {} (context {})",
            self.node, self.context
        )
    }
}

fn resume_hint(resume: &Option<ResumePoint>) -> String {
    resume
        .as_ref()
        .map(|r| format!("\n{}", r))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{status} {reason} ({detail})")]
    Terminal {
        status: u16,
        reason: String,
        detail: String,
    },

    #[error("{message}{}", resume_hint(.resume))]
    Authentication {
        message: String,
        resume: Option<ResumePoint>,
    },

    #[error("{message}{}", resume_hint(.resume))]
    TemporaryBlock {
        message: String,
        resume: Option<ResumePoint>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Attaches a resumption point to access failures. Other errors pass through unchanged.
    pub fn with_resume(self, point: ResumePoint) -> Self {
        match self {
            ScanError::Authentication { message, .. } => ScanError::Authentication {
                message,
                resume: Some(point),
            },
            ScanError::TemporaryBlock { message, .. } => ScanError::TemporaryBlock {
                message,
                resume: Some(point),
            },
            other => other,
        }
    }

    pub fn resume_point(&self) -> Option<&ResumePoint> {
        match self {
            ScanError::Authentication { resume, .. } | ScanError::TemporaryBlock { resume, .. } => {
                resume.as_ref()
            }
            _ => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            ScanError::Authentication { .. } | ScanError::TemporaryBlock { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
