//! Error types for line-level operations.
//!
//! [`DioError`] is what a line provider reports and what a composite device
//! hands back to its callers. Provider errors are carried verbatim through the
//! forwarding layer, so every variant keeps the information the provider gave.

use thiserror::Error;

/// Result type alias for line operations.
pub type DioResult<T> = std::result::Result<T, DioError>;

/// Coarse classification of a [`DioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DioErrorKind {
    /// The requested line or device does not exist, or is misconfigured.
    Configuration,
    /// The provider refused access.
    Permission,
    /// The line exists but the hardware operation failed.
    Hardware,
    /// The line is not usable in its current lifecycle state.
    Lifecycle,
    /// The caller passed an out-of-range or malformed argument.
    InvalidParameter,
}

impl std::fmt::Display for DioErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DioErrorKind::Configuration => "configuration",
            DioErrorKind::Permission => "permission",
            DioErrorKind::Hardware => "hardware",
            DioErrorKind::Lifecycle => "lifecycle",
            DioErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Errors that can occur when acquiring or operating digital lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DioError {
    /// No line matches the selector.
    #[error("Line '{selector}' not found")]
    NotFound { selector: String },

    /// The provider denied access to the line.
    #[error("Permission denied for line '{selector}'")]
    PermissionDenied { selector: String },

    /// The line is already requested by another consumer.
    #[error("Line '{selector}' is busy (requested by '{owner}')")]
    Busy { selector: String, owner: String },

    /// The position exists but no line is bound to it yet.
    #[error("Line {position} is not ready (not bound)")]
    NotReady { position: u32 },

    /// The position is outside the device.
    #[error("Invalid line {position}: device has {line_count} lines")]
    InvalidPosition { position: u32, line_count: u32 },

    /// A line is already bound at this position.
    #[error("Line {position} is already bound")]
    AlreadyBound { position: u32 },

    /// The device has been detached from its owner and no longer forwards.
    #[error("Device '{label}' has been detached")]
    Detached { label: String },

    /// The operation is not supported by this line or device.
    #[error("Operation not supported: {message}")]
    NotSupported { message: String },

    /// Malformed argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Hardware error reported by the provider.
    #[error("Hardware error: {message}")]
    Hardware { message: String },
}

impl DioError {
    /// Classify this error.
    pub fn kind(&self) -> DioErrorKind {
        match self {
            DioError::NotFound { .. } | DioError::NotSupported { .. } => {
                DioErrorKind::Configuration
            }
            DioError::PermissionDenied { .. } => DioErrorKind::Permission,
            DioError::Hardware { .. } => DioErrorKind::Hardware,
            DioError::Busy { .. }
            | DioError::NotReady { .. }
            | DioError::AlreadyBound { .. }
            | DioError::Detached { .. } => DioErrorKind::Lifecycle,
            DioError::InvalidPosition { .. } | DioError::InvalidArgument { .. } => {
                DioErrorKind::InvalidParameter
            }
        }
    }

    /// Check if this is a "line not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the position is waiting for a late-bound line.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    /// Check if the line is already taken.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DioError::InvalidPosition {
            position: 20,
            line_count: 16,
        };
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_error_kind() {
        let busy = DioError::Busy {
            selector: "gpio0 3".into(),
            owner: "dio-aggregator.1".into(),
        };
        assert_eq!(busy.kind(), DioErrorKind::Lifecycle);
        assert!(busy.is_busy());
        assert_eq!(
            DioError::PermissionDenied {
                selector: "reset".into()
            }
            .kind(),
            DioErrorKind::Permission
        );
        assert_eq!(DioErrorKind::InvalidParameter.to_string(), "invalid_parameter");
    }
}
