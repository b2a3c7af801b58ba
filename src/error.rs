//! Error types for the ancalagon loader.
//!
//! This module provides structured error handling using thiserror. Only
//! malformed input is fatal: out-of-range record indices, an undecodable
//! artifact buffer, structurally impossible records, and a failed external
//! export step. Everything else is logged and assembly continues with a
//! best-effort model.

use thiserror::Error;

/// Main error type for loader operations.
#[derive(Debug, Error)]
pub enum AncalagonError {
    /// A record referenced an index outside its table.
    #[error("{table} index {index} out of range")]
    RecordIndex { table: &'static str, index: usize },

    /// The artifact buffer could not be decoded into the record set.
    #[error("Undecodable artifact: {0}")]
    Decode(String),

    /// A record is structurally impossible to assemble.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external export step failed to produce an artifact.
    #[error("Artifact acquisition failed: {0}")]
    Acquisition(String),

    /// Byte-size query on an operand whose first expression is not a size prefix.
    #[error("Operand has no explicit size prefix")]
    NoSizePrefix,
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, AncalagonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AncalagonError::RecordIndex {
            table: "instruction",
            index: 42,
        };
        assert_eq!(err.to_string(), "instruction index 42 out of range");

        let err = AncalagonError::Decode("truncated buffer".to_string());
        assert_eq!(err.to_string(), "Undecodable artifact: truncated buffer");

        let err = AncalagonError::Acquisition("exporter exited with 1".to_string());
        assert_eq!(
            err.to_string(),
            "Artifact acquisition failed: exporter exited with 1"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AncalagonError = io.into();
        assert!(matches!(err, AncalagonError::Io(_)));
    }
}
