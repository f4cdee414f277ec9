//! Post-write verification
//!
//! Two checks back the write step:
//! - [`verify_checksum`] hashes the image and compares it with a published
//!   SHA-256 before anything touches the device
//! - [`DeviceVerifier`] reads the device back and compares it with the image,
//!   including the zero padding of the final block

use crate::config::WriteConfig;
use crate::device::BlockDevice;
use crate::error::{Error, IoError, Result};
use crate::source::is_cancellation;
use std::io::{self, Read};

/// Compares device contents against the image they were written from
pub struct DeviceVerifier {
    config: WriteConfig,
}

impl DeviceVerifier {
    /// Create a verifier with default configuration
    pub fn new() -> Self {
        Self::with_config(WriteConfig::default())
    }

    /// Create a verifier reading in chunks sized by `config`
    pub fn with_config(config: WriteConfig) -> Self {
        Self { config }
    }

    /// Verify that `device` holds `source`, starting at block 0
    ///
    /// `on_progress` receives the cumulative number of device bytes checked.
    /// Returns the number of bytes verified, padding included.
    pub fn verify<R, D, F>(&self, mut source: R, device: &mut D, mut on_progress: F) -> Result<u64>
    where
        R: Read,
        D: BlockDevice + ?Sized,
        F: FnMut(u64),
    {
        let block_size = device.block_size();
        if block_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "device {} reports a zero block size",
                device.name()
            )));
        }

        let chunk_size = self.config.chunk_bytes(block_size);
        let mut expected = vec![0u8; chunk_size];
        let mut actual = vec![0u8; chunk_size];
        let mut offset_blocks = 0u64;
        let mut verified = 0u64;

        loop {
            let n = read_full(&mut source, &mut expected).map_err(|e| source_error(e, verified))?;
            if n == 0 {
                break;
            }

            let padded = n.next_multiple_of(block_size);
            expected[n..padded].fill(0);

            device
                .read_blocks(offset_blocks, &mut actual[..padded])
                .map_err(|source| {
                    Error::Device(IoError {
                        device: device.name().to_string(),
                        offset_blocks,
                        source,
                    })
                })?;

            if let Some(pos) = expected[..padded]
                .iter()
                .zip(&actual[..padded])
                .position(|(e, a)| e != a)
            {
                tracing::debug!("Mismatch at byte {}", verified + pos as u64);
                return Err(Error::VerificationFailed {
                    offset: verified + pos as u64,
                    expected: expected[pos],
                    actual: actual[pos],
                });
            }

            offset_blocks += (padded / block_size) as u64;
            verified += padded as u64;
            on_progress(verified);

            if n < chunk_size {
                break;
            }
        }

        tracing::debug!("Verified {} bytes on {}", verified, device.name());
        Ok(verified)
    }
}

impl Default for DeviceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the SHA-256 of a stream as lowercase hex
///
/// `on_progress` receives the cumulative number of bytes hashed.
#[cfg(feature = "checksum")]
pub fn sha256_hex<R: Read, F: FnMut(u64)>(mut reader: R, mut on_progress: F) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; crate::config::DEFAULT_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = read_full(&mut reader, &mut buffer).map_err(|e| source_error(e, 0))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
        on_progress(total);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Check a stream against an expected SHA-256 hex digest
///
/// Comparison ignores case and surrounding whitespace. Returns the computed
/// digest.
#[cfg(feature = "checksum")]
pub fn verify_checksum<R: Read, F: FnMut(u64)>(
    reader: R,
    expected: &str,
    on_progress: F,
) -> Result<String> {
    let actual = sha256_hex(reader, on_progress)?;
    let expected = expected.trim();
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        });
    }
    Ok(actual)
}

/// Check a stream against an expected SHA-256 hex digest
#[cfg(not(feature = "checksum"))]
pub fn verify_checksum<R: Read, F: FnMut(u64)>(
    _reader: R,
    _expected: &str,
    _on_progress: F,
) -> Result<String> {
    Err(Error::InvalidConfig(
        "Checksum support not enabled. Rebuild with 'checksum' feature.".to_string(),
    ))
}

/// Read until the buffer is full or the stream ends
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut total_read = 0;

    while total_read < buffer.len() {
        match reader.read(&mut buffer[total_read..]) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(total_read)
}

fn source_error(err: io::Error, bytes_checked: u64) -> Error {
    if is_cancellation(&err) {
        Error::Cancelled
    } else {
        Error::ImageRead {
            bytes_checked,
            source: err,
        }
    }
}
