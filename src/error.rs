//! Error types for image-editing operations

use thiserror::Error;

/// Result type alias for image-editing operations
pub type Result<T> = std::result::Result<T, ImagingError>;

/// Caller-facing classification of every error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was invalid (bad coordinates, colors, factors, sizes)
    Input,
    /// Decoding, encoding or an algorithm failed on a valid request
    Processing,
    /// The remote accelerator failed (only surfaced in diagnostics, never to callers)
    RemoteService,
}

/// Comprehensive error types for image-editing operations
#[derive(Error, Debug)]
pub enum ImagingError {
    /// Invalid request parameters
    #[error("Invalid input: {0}")]
    Input(String),

    /// Codec or algorithm failure
    #[error("Processing error: {0}")]
    Processing(String),

    /// Remote accelerator failure (non-2xx, timeout, unreachable, unconfigured)
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format errors raised by the codec
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

impl ImagingError {
    /// Create a new input error
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Self::Input(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new remote service error
    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::RemoteService(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Classify the error into the caller-facing taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) | Self::InvalidConfig(_) => ErrorKind::Input,
            Self::RemoteService(_) => ErrorKind::RemoteService,
            Self::Processing(_) | Self::Io(_) | Self::Image(_) => ErrorKind::Processing,
        }
    }

    /// Whether the error was caused by the request rather than by processing
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        self.kind() == ErrorKind::Input
    }

    /// Create an input error for a value outside its valid range
    pub fn input_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::Input(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Create remote error for a non-success HTTP status
    pub fn remote_status(service: &str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        Self::RemoteService(format!(
            "{} service responded with status {}: {}",
            service, status, snippet
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ImagingError::input("coordinates out of bounds");
        assert!(matches!(err, ImagingError::Input(_)));
        assert!(err.is_input_error());

        let err = ImagingError::remote("timeout");
        assert_eq!(err.kind(), ErrorKind::RemoteService);
    }

    #[test]
    fn test_error_display() {
        let err = ImagingError::processing("segmentation failed");
        assert_eq!(err.to_string(), "Processing error: segmentation failed");
    }

    #[test]
    fn test_codec_errors_classify_as_processing() {
        let io_error = std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated");
        let err = ImagingError::from(io_error);
        assert_eq!(err.kind(), ErrorKind::Processing);
    }

    #[test]
    fn test_enhanced_error_context() {
        let err = ImagingError::config_value_error("timeout_secs", 0, "1-600", Some(60));
        let error_string = err.to_string();
        assert!(error_string.contains("timeout_secs"));
        assert!(error_string.contains("1-600"));
        assert!(error_string.contains("Recommended: 60"));

        let err = ImagingError::processing_stage_error(
            "inpainting",
            "empty removal region",
            Some("640x480 RGB"),
        );
        let error_string = err.to_string();
        assert!(error_string.contains("inpainting"));
        assert!(error_string.contains("640x480 RGB"));

        let err = ImagingError::remote_status("upscale", 503, "cold start");
        let error_string = err.to_string();
        assert!(error_string.contains("503"));
        assert!(error_string.contains("upscale"));
    }
}
