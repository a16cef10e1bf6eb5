//! Error types for the aggregation engine.
//!
//! `AggregatorError` is the single error type returned by request parsing,
//! table building, aggregator creation and destruction, the management
//! surface and configuration loading. Errors coming from a line provider or
//! from a forwarded line operation are wrapped without alteration so the
//! caller sees exactly what the provider reported.
//!
//! ## Error classes
//!
//! - **Parse**: the request text is malformed (`Parse`).
//! - **Resolution**: a line selector could not be turned into an acquired
//!   handle (`Resolve`).
//! - **Duplicate**: the same line appears twice in one request
//!   (`DuplicateLine`).
//! - **Runtime**: a forwarded line operation failed (`Forward`).
//! - **Lifecycle**: the management surface was given an unknown or
//!   malformed device name, or publishing failed (`NoSuchDevice`,
//!   `InvalidDeviceName`, `Publish`, `InvalidCommand`).
//! - **Fatal**: resources ran out or configuration is unusable
//!   (`OutOfMemory`, `Config`, `Configuration`).

use dio_core::{DioError, HwIndex};
use thiserror::Error;

use crate::parser::ParseError;

/// Convenience alias for results using the engine error type.
pub type AggregatorResult<T> = std::result::Result<T, AggregatorError>;

/// Coarse classification used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed request text
    Parse,
    /// A requested line could not be acquired
    Resolution,
    /// Same line requested twice
    Duplicate,
    /// A forwarded line operation failed
    Runtime,
    /// Unknown or malformed device name
    Lifecycle,
    /// Resource exhaustion or unusable configuration
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorClass::Parse => "parse",
            ErrorClass::Resolution => "resolution",
            ErrorClass::Duplicate => "duplicate",
            ErrorClass::Runtime => "runtime",
            ErrorClass::Lifecycle => "lifecycle",
            ErrorClass::Fatal => "fatal",
        };
        write!(f, "{}", label)
    }
}

/// Errors from creating, deleting and driving aggregators.
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Request text rejected by the parser
    #[error("Invalid request: {0}")]
    Parse(#[from] ParseError),

    /// A line appears more than once in one request
    #[error("Duplicate line {key} {hw_index} in request")]
    DuplicateLine { key: String, hw_index: HwIndex },

    /// Allocation failed while growing the lookup table
    #[error("Out of memory while building lookup table")]
    OutOfMemory,

    /// The provider refused a line; earlier lines were released
    #[error("Cannot acquire line '{selector}': {source}")]
    Resolve {
        selector: String,
        #[source]
        source: DioError,
    },

    /// The publisher rejected the new device
    #[error("Cannot publish device '{name}': {source}")]
    Publish {
        name: String,
        #[source]
        source: DioError,
    },

    /// Device name is not `<prefix>.<id>`
    #[error("Invalid device name '{input}'")]
    InvalidDeviceName { input: String },

    /// No live device has this id
    #[error("No such device: {id}")]
    NoSuchDevice { id: u32 },

    /// Console command could not be understood
    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    /// Error from a line operation, passed through unchanged
    #[error("Line operation failed: {0}")]
    Forward(#[from] DioError),

    /// Configuration file or environment could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Loaded configuration is inconsistent
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for AggregatorError {
    fn from(err: figment::Error) -> Self {
        AggregatorError::Config(Box::new(err))
    }
}

impl AggregatorError {
    /// Class of this error.
    pub fn kind(&self) -> ErrorClass {
        match self {
            AggregatorError::Parse(_) => ErrorClass::Parse,
            AggregatorError::DuplicateLine { .. } => ErrorClass::Duplicate,
            AggregatorError::Resolve { .. } => ErrorClass::Resolution,
            AggregatorError::Forward(_) => ErrorClass::Runtime,
            AggregatorError::Publish { .. }
            | AggregatorError::InvalidDeviceName { .. }
            | AggregatorError::NoSuchDevice { .. }
            | AggregatorError::InvalidCommand { .. } => ErrorClass::Lifecycle,
            AggregatorError::OutOfMemory
            | AggregatorError::Config(_)
            | AggregatorError::Configuration(_) => ErrorClass::Fatal,
        }
    }

    /// The provider error behind a resolution, publish or forwarded failure.
    pub fn line_error(&self) -> Option<&DioError> {
        match self {
            AggregatorError::Resolve { source, .. } | AggregatorError::Publish { source, .. } => {
                Some(source)
            }
            AggregatorError::Forward(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn command(message: impl Into<String>) -> Self {
        AggregatorError::InvalidCommand {
            message: message.into(),
        }
    }
}
