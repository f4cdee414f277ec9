//! Runtime configuration for write operations

/// Default chunk size targeted per device write (1 MiB, 512 * 32 * 64)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 32 * 64;

/// Minimum chunk size (4 KB)
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Maximum chunk size (64 MB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for [`BlockWriter`](crate::writer::BlockWriter)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    /// Target number of bytes per device write
    ///
    /// Rounded down to a whole number of device blocks (at least one) when
    /// the write starts.
    pub chunk_size: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl WriteConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk size (clamped to valid range)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set chunk size without clamping
    ///
    /// Useful for exercising tiny chunk sizes against small sector sizes.
    pub fn exact_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Chunk size in bytes for a device with the given block size
    ///
    /// Always a non-zero multiple of `block_size`.
    pub fn chunk_bytes(&self, block_size: usize) -> usize {
        let blocks = (self.chunk_size / block_size).max(1);
        blocks * block_size
    }
}
