//! Error types for TideStore operations
//!
//! All TideStore errors are represented by the TideError enum, which provides
//! detailed context for debugging and recovery.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// TideStore error types with detailed context
#[derive(Debug, Clone)]
pub enum TideError {
    /// Invalid construction-time configuration (buffer thresholds)
    Configuration {
        /// Name of the offending parameter
        parameter: &'static str,
        /// Human-readable description
        reason: String,
    },

    /// A change failed validation before entering the buffer
    Validation {
        /// Name of the offending field
        field: &'static str,
        /// Human-readable description
        reason: String,
    },

    /// Unknown change tag byte found while decoding
    UnknownChangeTag {
        /// The tag byte that was read
        tag: u8,
        /// Byte offset of the tag in the input
        offset: u64,
    },

    /// Encoded data is truncated or structurally invalid
    Corrupted {
        /// File where corruption was detected, if decoding from a file
        path: Option<PathBuf>,
        /// Byte offset where corruption was detected
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// Checksum verification failed
    ChecksumMismatch {
        /// File where checksum failed
        path: PathBuf,
        /// Expected checksum value
        expected: u32,
        /// Actual checksum computed
        actual: u32,
        /// Byte offset of the corrupted record
        offset: u64,
    },

    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },
}

impl fmt::Display for TideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TideError::Configuration { parameter, reason } => {
                write!(f, "Invalid configuration for {}: {}", parameter, reason)
            }

            TideError::Validation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }

            TideError::UnknownChangeTag { tag, offset } => {
                write!(f, "Unknown change tag 0x{:02x} at offset {}", tag, offset)
            }

            TideError::Corrupted { path, offset, reason } => {
                if let Some(path) = path {
                    write!(f, "Corrupted data in {} at offset {}: {}", path.display(), offset, reason)
                } else {
                    write!(f, "Corrupted data at offset {}: {}", offset, reason)
                }
            }

            TideError::ChecksumMismatch { path, expected, actual, offset } => {
                write!(f, "Checksum mismatch in {} at offset {}: expected 0x{:08x}, got 0x{:08x}",
                       path.display(), offset, expected, actual)
            }

            TideError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }
        }
    }
}

impl Error for TideError {}

/// Convert std::io::Error to TideError::Io
impl From<std::io::Error> for TideError {
    fn from(err: std::io::Error) -> Self {
        TideError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for TideStore operations
pub type TideResult<T> = Result<T, TideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = TideError::Validation {
            field: "chunks",
            reason: "chunk list is empty".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("chunks"));
        assert!(display.contains("empty"));
    }

    #[test]
    fn test_checksum_display() {
        let err = TideError::ChecksumMismatch {
            path: PathBuf::from("/tmp/journal-0.tide"),
            expected: 0x12345678,
            actual: 0x87654321,
            offset: 1024,
        };

        let display = format!("{}", err);
        assert!(display.contains("Checksum mismatch"));
        assert!(display.contains("0x12345678"));
        assert!(display.contains("0x87654321"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let tide_err: TideError = io_err.into();

        match tide_err {
            TideError::Io { kind, .. } => assert_eq!(kind, std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }
}
