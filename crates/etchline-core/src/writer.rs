//! Block-aligned streaming writer
//!
//! This module turns an arbitrary byte stream into sector-aligned writes:
//! - One reusable chunk buffer, a whole number of device blocks long
//! - Unaligned tail bytes carried over to the next iteration
//! - The final partial block zero-padded on end-of-stream
//! - Progress reported after every device write
//!
//! A failed device write aborts the transfer immediately. The returned
//! [`WriteError`] records how many bytes were committed so the caller can
//! decide whether to retry or resume.

use crate::config::WriteConfig;
use crate::device::BlockDevice;
use crate::error::{Error, IoError, Result, WriteError};
use crate::source::is_cancellation;
use crate::wake_lock::{NoopWakeLock, WakeLock, WakeLockGuard};
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;

/// Progress of an in-flight write
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WriteSession {
    /// Next block to write
    offset_blocks: u64,
    /// Bytes committed to the device
    bytes_written: u64,
    /// Carry-over bytes at the start of the buffer
    remaining: usize,
}

/// Streams an image onto a [`BlockDevice`]
pub struct BlockWriter {
    config: WriteConfig,
    wake_lock: Arc<dyn WakeLock + Send + Sync>,
}

impl BlockWriter {
    /// Create a new writer with default configuration
    pub fn new() -> Self {
        Self::with_config(WriteConfig::default())
    }

    /// Create a new writer with custom configuration
    pub fn with_config(config: WriteConfig) -> Self {
        Self {
            config,
            wake_lock: Arc::new(NoopWakeLock),
        }
    }

    /// Hold `lock` for the duration of every write
    pub fn wake_lock(mut self, lock: Arc<dyn WakeLock + Send + Sync>) -> Self {
        self.wake_lock = lock;
        self
    }

    /// Get the writer configuration
    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    /// Write `source` to `device` starting at block 0
    ///
    /// `on_progress` receives the cumulative number of bytes written after
    /// each device write. The total includes the zero padding of the final
    /// block, so it is always a multiple of the device block size.
    ///
    /// # Returns
    /// * `Ok(bytes)` - Bytes written, `0` for an empty stream
    /// * `Err(Error::Write)` - A device write failed
    /// * `Err(Error::Read)` - The source failed
    /// * `Err(Error::Cancelled)` - The source was cancelled
    pub fn write<R, D, F>(&self, mut source: R, device: &mut D, mut on_progress: F) -> Result<u64>
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
        let mut buffer = vec![0u8; chunk_size];
        let mut session = WriteSession::default();
        let start_time = Instant::now();

        tracing::debug!(
            "Writing to {} (block_size={}, chunk_size={})",
            device.name(),
            block_size,
            chunk_size
        );

        let guard = WakeLockGuard::new(&*self.wake_lock);

        loop {
            guard.refresh();

            let n = read_chunk(&mut source, &mut buffer[session.remaining..]).map_err(|e| {
                if is_cancellation(&e) {
                    tracing::debug!("Write cancelled after {} bytes", session.bytes_written);
                    Error::Cancelled
                } else {
                    Error::Read {
                        bytes_written: session.bytes_written,
                        source: e,
                    }
                }
            })?;

            let end_of_stream = n == 0;
            let mut read_bytes = session.remaining + n;

            if end_of_stream {
                if session.remaining == 0 {
                    break;
                }
                // Pad the last partial block with zeros
                let padded = read_bytes.next_multiple_of(block_size);
                buffer[read_bytes..padded].fill(0);
                read_bytes = padded;
            }

            let remaining = read_bytes % block_size;
            let aligned = read_bytes - remaining;

            if aligned > 0 {
                write_chunk(device, &buffer[..aligned], &session)?;

                session.offset_blocks += (aligned / block_size) as u64;
                session.bytes_written += aligned as u64;
                on_progress(session.bytes_written);
            }

            buffer.copy_within(aligned..read_bytes, 0);
            session.remaining = remaining;

            if end_of_stream {
                break;
            }
        }

        tracing::debug!(
            "Wrote {} bytes ({} blocks) to {} in {:?}",
            session.bytes_written,
            session.offset_blocks,
            device.name(),
            start_time.elapsed()
        );

        Ok(session.bytes_written)
    }
}

impl Default for BlockWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one aligned chunk at the session's current offset
fn write_chunk<D: BlockDevice + ?Sized>(
    device: &mut D,
    chunk: &[u8],
    session: &WriteSession,
) -> Result<()> {
    let offset = session.offset_blocks;
    device.write_blocks(offset, chunk).map_err(|source| {
        tracing::debug!("Write of {} bytes at block {} failed", chunk.len(), offset);
        Error::Write(WriteError {
            failed_at_offset_blocks: offset,
            bytes_written_before_failure: session.bytes_written,
            source: IoError {
                device: device.name().to_string(),
                offset_blocks: offset,
                source,
            },
        })
    })
}

/// Single read, retried only when interrupted by a signal
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buffer) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
