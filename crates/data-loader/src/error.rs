//! Error types for the data-loader crate.
//!
//! Every variant carries enough context to tell the user which part of the
//! ratings file or query was rejected.

use thiserror::Error;

/// Errors that can occur while loading ratings or parsing a query
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// I/O error occurred while reading file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A token in the ratings file couldn't be parsed
    #[error("Parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    /// A value parsed but is not usable (NaN, infinite)
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// The body holds a different number of values than the header promised
    #[error("Expected {expected} values but found {found} (last line read: {line})")]
    FieldCountMismatch {
        expected: usize,
        found: usize,
        line: usize,
    },

    /// `n` or `m` is zero, or the value buffer does not hold `n * m` entries
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
