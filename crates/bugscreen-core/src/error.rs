use thiserror::Error;

use crate::record::RecordField;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Anchor export not found: {0}")]
    AnchorNotFound(String),

    #[error("Signature '{name}' not found (scanned {scanned} bytes before the end of function)")]
    SignatureNotFound { name: String, scanned: usize },

    #[error("Scan for '{name}' exceeded {max_scan} bytes without reaching a signature or sentinel")]
    ScanBoundsExceeded { name: String, max_scan: usize },

    #[error("Dereference of {width} bytes at {address:#x} is outside {start:#x}..{end:#x}")]
    DereferenceOutOfRange {
        address: u64,
        width: usize,
        start: u64,
        end: u64,
    },

    #[error("Failed to read memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to map {len} bytes at {address:#x} writable: {message}")]
    MappingFailed {
        address: u64,
        len: usize,
        message: String,
    },

    #[error("Payload for '{name}' is {len} bytes, capacity is {max_len}")]
    PayloadTooLarge {
        name: String,
        len: usize,
        max_len: usize,
    },

    #[error("Resolution record is missing field: {0}")]
    MissingField(RecordField),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid chain step: {0}")]
    InvalidChain(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error means a resolution target could not be located
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AnchorNotFound(_)
                | Error::SignatureNotFound { .. }
                | Error::ScanBoundsExceeded { .. }
                | Error::MissingField(_)
        ) || matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<object::read::Error> for Error {
    fn from(e: object::read::Error) -> Self {
        Error::Image(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let err = Error::SignatureNotFound {
            name: "bugCheckEntry".to_string(),
            scanned: 12,
        };
        assert!(err.is_not_found());

        let err = Error::ScanBoundsExceeded {
            name: "bugCheckEntry".to_string(),
            max_scan: 100,
        };
        assert!(err.is_not_found());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(Error::Io(io_err).is_not_found());

        let err = Error::PayloadTooLarge {
            name: "face".to_string(),
            len: 10,
            max_len: 8,
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_messages_carry_hex_addresses() {
        let err = Error::DereferenceOutOfRange {
            address: 0x1000,
            width: 8,
            start: 0x2000,
            end: 0x3000,
        };
        assert_eq!(
            err.to_string(),
            "Dereference of 8 bytes at 0x1000 is outside 0x2000..0x3000"
        );
    }
}
