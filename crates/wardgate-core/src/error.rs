//! Error types for Wardgate

use thiserror::Error;

/// Result type alias using Wardgate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Wardgate error types
///
/// `RecordNotFound` and `AccessDenied` are deliberately distinct conditions:
/// callers may tell "no such record" apart from "record exists but you may
/// not see it". `AccessDenied` is opaque on purpose: it never says whether
/// the remote policy service or a local security rule rejected the request.
#[derive(Error, Debug)]
pub enum Error {
    // Caller-visible access conditions (E100-E199)
    #[error("record '{0}' not found")]
    RecordNotFound(String),

    #[error("access denied")]
    AccessDenied,

    // Collaborator errors (E200-E299)
    #[error("search backend unavailable: {0}")]
    SearchUnavailable(String),

    #[error("policy service error: {0}")]
    PolicyUnavailable(String),

    // Config errors (E300-E399)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Audit errors (E400-E499), produced by sinks and always swallowed
    // at emission sites, never surfaced to a caller
    #[error("audit emission failed: {0}")]
    Audit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecordNotFound(_) => "E100",
            Self::AccessDenied => "E101",
            Self::SearchUnavailable(_) => "E200",
            Self::PolicyUnavailable(_) => "E201",
            Self::Config(_) => "E300",
            Self::InvalidInput(_) => "E301",
            Self::Audit(_) => "E400",
            Self::Io(_) => "E999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SearchUnavailable(_) | Self::PolicyUnavailable(_) => {
                Some("wardgate doctor".to_string())
            }
            Self::Config(_) => Some("wardgate config list".to_string()),
            _ => None,
        }
    }
}
