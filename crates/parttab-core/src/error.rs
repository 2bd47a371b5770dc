//! Partition table error types

use thiserror::Error;

/// The main error type for partition table operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while talking to the underlying byte source or sink
    #[error("Pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes were available than the structure requires
    #[error("Truncated input reading {context}: needed {needed} bytes, {available} available")]
    Truncated {
        context: String,
        needed: u64,
        available: u64,
    },

    /// MBR boot signature or GPT "EFI PART" signature mismatch
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Sector size is not a positive multiple of 512
    #[error("Unsupported sector size: {0} (must be a positive multiple of 512)")]
    UnsupportedSectorSize(u32),

    /// Neither GPT copy could be decoded
    #[error("No valid partition table: {0}")]
    NoValidTable(String),

    /// Encode followed by decode did not reproduce valid checksums
    #[error("Internal round-trip failure: {0}")]
    InternalRoundTrip(String),

    /// Structurally impossible header or entry array
    #[error("Invalid zone table: {0}")]
    InvalidZoneTable(String),

    /// Rejected edit of an in-memory table
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias for partition table operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a truncation error
    pub fn truncated(context: impl Into<String>, needed: u64, available: u64) -> Self {
        Error::Truncated {
            context: context.into(),
            needed,
            available,
        }
    }

    /// Create an invalid signature error
    pub fn invalid_signature(msg: impl Into<String>) -> Self {
        Error::InvalidSignature(msg.into())
    }

    /// Create a no valid table error
    pub fn no_valid_table(msg: impl Into<String>) -> Self {
        Error::NoValidTable(msg.into())
    }

    /// Create an internal round-trip error
    pub fn internal_round_trip(msg: impl Into<String>) -> Self {
        Error::InternalRoundTrip(msg.into())
    }

    /// Create an invalid zone table error
    pub fn invalid_zone_table(msg: impl Into<String>) -> Self {
        Error::InvalidZoneTable(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// True for failures caused by the on-disk content rather than the transport
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Truncated { .. } | Error::InvalidSignature(_) | Error::InvalidZoneTable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_message() {
        let err = Error::truncated("MBR", 512, 100);
        assert_eq!(
            err.to_string(),
            "Truncated input reading MBR: needed 512 bytes, 100 available"
        );
        assert!(err.is_format_error());
    }

    #[test]
    fn test_io_is_not_format_error() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(!err.is_format_error());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_sector_size_message() {
        let err = Error::UnsupportedSectorSize(513);
        assert!(err.to_string().contains("513"));
    }
}
