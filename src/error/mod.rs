//! Error types for Switchboard.

use thiserror::Error;

/// Primary error type for all Switchboard operations.
#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Configuration,
    Network,
    Launch,
    Stream,
    Session,
    Serialization,
    Unknown,
}

impl SwitchboardError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(_) => ErrorCategory::Network,
            Self::Launch(_) => ErrorCategory::Launch,
            Self::Stream(_) => ErrorCategory::Stream,
            Self::Session(_) => ErrorCategory::Session,
            Self::Serialization(_) => ErrorCategory::Serialization,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Launch failures are deliberately non-retryable: surfacing them
    /// immediately is preferred over a silent hang.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network)
    }
}

impl From<toml::de::Error> for SwitchboardError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SwitchboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failure_is_not_retryable() {
        let err = SwitchboardError::Launch("runtime unavailable".to_string());
        assert_eq!(err.category(), ErrorCategory::Launch);
        assert!(!err.is_retryable());
    }

    #[test]
    fn authentication_display_includes_detail() {
        let err = SwitchboardError::Authentication("token expired".to_string());
        assert!(err.to_string().contains("token expired"));
    }
}
