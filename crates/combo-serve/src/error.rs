//! Error types for the combo server.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use std::path::PathBuf;
use thiserror::Error;

/// Bitmask token decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Token is empty or contains characters outside the radix-32 alphabet
    #[error("malformed token: {0:?}")]
    MalformedToken(String),

    /// Token decodes to a mask with no bits set
    #[error("empty selection")]
    EmptySelection,

    /// A set bit addresses an index the database does not define
    #[error("unknown index {0}")]
    UnknownIndex(usize),

    /// Mask references bits beyond the database index space
    #[error("index out of range: bit {bit} with {len} known indices")]
    IndexOutOfRange {
        /// Highest offending bit position
        bit: usize,
        /// Size of the database index space
        len: usize,
    },
}

/// URL shape errors for requests that look like a combo URL but are unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Combo list or token segment is empty
    #[error("empty combo segment in {0}")]
    EmptySegment(String),

    /// Percent-encoding could not be decoded as UTF-8
    #[error("invalid percent-encoding in {0}")]
    InvalidEncoding(String),
}

/// Index database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to read the database file
    #[error("Failed to load database from {path}: {source}")]
    LoadFailed {
        /// Path to the database file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid JSON format in database file
    #[error("Invalid JSON in database file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Object key that is not a non-negative integer
    #[error("Invalid index key {0:?}")]
    InvalidIndex(String),

    /// Database file resolves outside the served root
    #[error("Database file outside root: {0}")]
    OutsideRoot(PathBuf),

    /// Token could not be decoded against the database
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Path validation errors.
#[derive(Debug, Error)]
pub enum CheckError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but is not a regular file
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Path resolves outside the served root
    #[error("Path escapes root: {0}")]
    OutsideRoot(PathBuf),

    /// Other I/O failure while checking
    #[error("Failed to check {path}: {source}")]
    Io {
        /// Path being checked
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors while gathering stats or streaming file content.
#[derive(Debug, Error)]
pub enum StreamError {
    /// File could not be stat'ed or opened
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Path being opened
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Read failed mid-stream
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File shrank between stat and read
    #[error("File {path} truncated: expected {expected} bytes, read {actual}")]
    Truncated {
        /// Path being read
        path: PathBuf,
        /// Size reported by stat
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// Nothing to combine
    #[error("No files to combine")]
    Empty,
}

/// Failure of a matched combo request, after parsing succeeded.
#[derive(Debug, Error)]
pub enum ComboError {
    /// Path validation failed
    #[error(transparent)]
    Check(#[from] CheckError),

    /// Stats collection or streaming failed
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Root directory is missing or not a directory
    #[error("Invalid root directory {path}: {reason}")]
    InvalidRoot {
        /// Configured root
        path: PathBuf,
        /// Reason for invalidity
        reason: String,
    },

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Value outside its allowed range
    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        /// Option name
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind HTTP server
    #[error("Failed to bind HTTP server to {addr}: {source}")]
    HttpBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    Shutdown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_messages() {
        assert_eq!(DecodeError::EmptySelection.to_string(), "empty selection");
        assert_eq!(DecodeError::UnknownIndex(4).to_string(), "unknown index 4");
        let err = DecodeError::IndexOutOfRange { bit: 10, len: 10 };
        assert!(err.to_string().starts_with("index out of range"));
        let err = DecodeError::MalformedToken("&^%".to_string());
        assert!(err.to_string().starts_with("malformed token"));
    }

    #[test]
    fn test_combo_error_conversion() {
        let check_err = CheckError::NotFound(PathBuf::from("/srv/a.js"));
        let err: ComboError = check_err.into();
        assert!(matches!(err, ComboError::Check(CheckError::NotFound(_))));
        assert_eq!(err.to_string(), "File not found: /srv/a.js");
    }

    #[test]
    fn test_database_error_from_decode() {
        let err: DatabaseError = DecodeError::EmptySelection.into();
        assert!(err.to_string().contains("empty selection"));
    }
}
