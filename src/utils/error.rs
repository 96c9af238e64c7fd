//! Error types and handling
//!
//! Collaborator failures and the crate-wide error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by capture collaborators (camera, classifier, speech)
///
/// Both variants display as the bare message so it can be shown to the user
/// as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A collaborator could not acquire its resource (permission denied,
    /// device unavailable, model missing)
    #[error("{0}")]
    Start(String),

    /// A running stream terminated abnormally mid-session
    #[error("{0}")]
    StreamFault(String),
}

impl CaptureError {
    pub fn start(message: impl Into<String>) -> Self {
        Self::Start(message.into())
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::StreamFault(message.into())
    }
}

/// Result type for collaborator calls
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum FusionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error response for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&FusionError> for ErrorResponse {
    fn from(error: &FusionError) -> Self {
        let code = match error {
            FusionError::Capture(CaptureError::Start(_)) => "START_ERROR",
            FusionError::Capture(CaptureError::StreamFault(_)) => "STREAM_FAULT",
            FusionError::Config(_) => "CONFIG_ERROR",
            FusionError::Io(_) => "IO_ERROR",
            FusionError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<FusionError> for ErrorResponse {
    fn from(error: FusionError) -> Self {
        Self::from(&error)
    }
}

/// Result type alias using FusionError
pub type FusionResult<T> = Result<T, FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_displays_bare_message() {
        assert_eq!(CaptureError::start("mic denied").to_string(), "mic denied");
        assert_eq!(
            CaptureError::fault("camera disconnected").to_string(),
            "camera disconnected"
        );
    }

    #[test]
    fn test_fusion_error_is_transparent_for_capture() {
        let error: FusionError = CaptureError::start("camera busy").into();
        assert_eq!(error.to_string(), "camera busy");
    }

    #[test]
    fn test_error_response_codes() {
        let start: FusionError = CaptureError::start("mic denied").into();
        let response = ErrorResponse::from(&start);
        assert_eq!(response.code, "START_ERROR");
        assert_eq!(response.message, "mic denied");

        let fault: FusionError = CaptureError::fault("stream ended").into();
        assert_eq!(ErrorResponse::from(fault).code, "STREAM_FAULT");

        let config = FusionError::Config("maxHistory must be at most 500".to_string());
        let response = ErrorResponse::from(config);
        assert_eq!(response.code, "CONFIG_ERROR");
        assert_eq!(
            response.message,
            "Configuration error: maxHistory must be at most 500"
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let error = FusionError::from(parse);
        assert_eq!(ErrorResponse::from(&error).code, "SERIALIZATION_ERROR");
    }
}
