//! # Error Types
//!
//! Custom error types for Flight TestPilot using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Flight TestPilot
#[derive(Debug, Error)]
pub enum TestPilotError {
    /// An activity with this label is already recording
    #[error("Activity label already in use: {0}")]
    DuplicateLabel(String),

    /// `start` named a kind that has no constructor
    #[error("Unknown activity kind: {0}")]
    UnknownActivityKind(String),

    /// Output file for an activity could not be opened or written
    #[error("Sink unavailable at {}: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Expression references a message type that has not been received yet
    #[error("No {0} message received yet")]
    MissingDependency(String),

    /// Message type was received but does not carry the referenced field
    #[error("Message {msg_type} has no field '{field}'")]
    UnknownField { msg_type: String, field: String },

    /// Field expression text could not be parsed
    #[error("Invalid field expression '{expression}': {reason}")]
    ExpressionParse { expression: String, reason: String },

    /// Not enough samples to smooth
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Samples cannot support a fit (e.g. all x equal)
    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),

    /// NaN or infinite sample handed to the smoother
    #[error("Non-finite sample at index {0}")]
    NonFiniteSample(usize),

    /// Division by zero in a field expression or metric derivation
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// `stop` by index beyond the current activity count
    #[error("Activity index {index} out of range ({len} active)")]
    IndexOutOfRange { index: usize, len: usize },

    /// `stop` identifier is neither a label nor a valid index
    #[error("No activity labelled '{0}'")]
    LabelNotFound(String),

    /// Activity kind needs field expressions and none were given
    #[error("Activity kind '{0}' requires at least one field expression")]
    MissingFields(String),

    /// Recorded table lacks a column needed for analysis
    #[error("Column '{0}' not found in recorded table")]
    MissingColumn(String),

    /// Recorded table could not be parsed
    #[error("Malformed table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },

    /// Takeoff analysis found no row past the movement threshold
    #[error("Unable to determine takeoff time")]
    TakeoffNotDetected,

    /// Report renderer failure
    #[error("Report rendering error: {0}")]
    Render(String),

    /// Operator command was malformed
    #[error("usage: {0}")]
    Usage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Settings serialization error: {0}")]
    SettingsWrite(#[from] toml::ser::Error),

    /// JSON (feed or report) errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Flight TestPilot
pub type Result<T> = std::result::Result<T, TestPilotError>;
