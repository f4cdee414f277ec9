//! Error types for the Etchline core library

use thiserror::Error;

/// Main error type for Etchline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Image source not found or inaccessible
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Generic IO error outside of device block access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device block access failed
    #[error(transparent)]
    Device(#[from] IoError),

    /// Writing a chunk to the device failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Reading the input stream failed for a reason other than end-of-stream
    #[error("Read from source failed after {bytes_written} bytes were written: {source}")]
    Read {
        /// Bytes committed to the device before the failing read
        bytes_written: u64,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Reading the image failed while hashing it or comparing it with the device
    #[error("Reading the image failed after {bytes_checked} bytes were checked: {source}")]
    ImageRead {
        /// Image bytes hashed or compared before the failing read
        bytes_checked: u64,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Progress aggregator used out of order
    #[error(transparent)]
    State(#[from] StateError),

    /// Procedure definition rejected
    #[error("Invalid procedure: {0}")]
    InvalidProcedure(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No procedure registered for the job
    #[error("No procedure found for job {0}")]
    JobNotFound(u64),

    /// Device contents differ from the image
    #[error("Verification failed at byte {offset}: expected {expected:#04x}, got {actual:#04x}")]
    VerificationFailed {
        /// Byte offset of the first mismatch
        offset: u64,
        /// Byte from the image (zero for block padding)
        expected: u8,
        /// Byte read back from the device
        actual: u8,
    },

    /// Image checksum does not match the expected value
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected checksum
        expected: String,
        /// Actual checksum
        actual: String,
    },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Bytes committed to the device before the failure, when the error
    /// came out of a write operation
    pub fn bytes_written(&self) -> Option<u64> {
        match self {
            Error::Write(e) => Some(e.bytes_written_before_failure),
            Error::Read { bytes_written, .. } => Some(*bytes_written),
            _ => None,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SourceNotFound(_) => "source_not_found",
            Error::Io(_) => "io",
            Error::Device(_) => "device",
            Error::Write(_) => "write",
            Error::Read { .. } => "read",
            Error::ImageRead { .. } => "image_read",
            Error::State(_) => "state",
            Error::InvalidProcedure(_) => "invalid_procedure",
            Error::InvalidConfig(_) => "invalid_config",
            Error::JobNotFound(_) => "job_not_found",
            Error::VerificationFailed { .. } => "verification_failed",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::Cancelled => "cancelled",
        }
    }
}

/// Block device access failure
#[derive(Error, Debug)]
#[error("Device {device} failed at block {offset_blocks}: {source}")]
pub struct IoError {
    /// Identity of the device
    pub device: String,
    /// Block offset of the failed access
    pub offset_blocks: u64,
    /// The underlying error
    #[source]
    pub source: std::io::Error,
}

/// A device write failed part way through an image
///
/// Everything before `failed_at_offset_blocks` is committed, so a caller can
/// resume from `bytes_written_before_failure`.
#[derive(Error, Debug)]
#[error(
    "Write failed at block {failed_at_offset_blocks} after {bytes_written_before_failure} bytes: {source}"
)]
pub struct WriteError {
    /// Block offset of the write that failed
    pub failed_at_offset_blocks: u64,
    /// Bytes successfully written before the failure
    pub bytes_written_before_failure: u64,
    /// The device error
    #[source]
    pub source: IoError,
}

/// Misuse of the progress aggregator state machine
///
/// These indicate a bug in the caller driving the aggregator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A progress method was called without a procedure in progress
    #[error("Call to {operation}() without a procedure in progress")]
    NotStarted {
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// The procedure was started twice
    #[error("Procedure already in progress")]
    AlreadyStarted,

    /// The step index does not exist in the procedure
    #[error("Step {index} out of range for procedure with {len} steps")]
    StepOutOfRange {
        /// Requested step
        index: usize,
        /// Number of steps in the procedure
        len: usize,
    },
}

/// Result type alias using the Etchline error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn device_error() -> IoError {
        IoError {
            device: "usb0".to_string(),
            offset_blocks: 8,
            source: std::io::Error::other("pipe stalled"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::SourceNotFound("/path/to/image.img".to_string());
        assert!(err.to_string().contains("/path/to/image.img"));

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_io_error_display() {
        let msg = device_error().to_string();
        assert!(msg.contains("usb0"));
        assert!(msg.contains("block 8"));
        assert!(msg.contains("pipe stalled"));
    }

    #[test]
    fn test_write_error_carries_progress() {
        let err: Error = WriteError {
            failed_at_offset_blocks: 8,
            bytes_written_before_failure: 4096,
            source: device_error(),
        }
        .into();

        assert_eq!(err.bytes_written(), Some(4096));
        assert_eq!(err.kind(), "write");
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_read_error_carries_progress() {
        let err = Error::Read {
            bytes_written: 512,
            source: std::io::Error::other("usb unplugged"),
        };
        assert_eq!(err.bytes_written(), Some(512));
        assert!(err.to_string().contains("usb unplugged"));
    }

    #[test]
    fn test_bytes_written_absent_for_other_errors() {
        let err = Error::ImageRead {
            bytes_checked: 4096,
            source: std::io::Error::other("bad sector"),
        };
        assert_eq!(err.bytes_written(), None);
        assert_eq!(err.kind(), "image_read");
        assert!(err.to_string().contains("4096 bytes were checked"));

        assert_eq!(Error::Cancelled.bytes_written(), None);
        assert_eq!(Error::JobNotFound(3).bytes_written(), None);
    }

    #[test]
    fn test_state_error_display() {
        let err = StateError::NotStarted {
            operation: "on_action_start",
        };
        assert!(err.to_string().contains("on_action_start"));

        let err = StateError::StepOutOfRange { index: 4, len: 2 };
        assert!(err.to_string().contains('4'));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_verification_failed_display() {
        let err = Error::VerificationFailed {
            offset: 1000,
            expected: 0,
            actual: 0xab,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("0xab"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
