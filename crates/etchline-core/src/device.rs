//! Block device abstraction
//!
//! The writer and verifier only see a device through [`BlockDevice`]: a
//! fixed sector size and block-addressed reads and writes. Acquiring the
//! underlying handle (a USB mass storage LUN, a `/dev/sdX` node, an image
//! file) is the host's business; [`StreamBlockDevice`] covers any
//! [`Medium`], a seekable stream that knows how to commit its writes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default sector size for USB mass storage devices
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// A storage target addressed in fixed-size blocks
///
/// Offsets are in blocks, buffer lengths in bytes. Buffers passed to
/// `write_blocks` and `read_blocks` are always a multiple of `block_size()`.
#[cfg_attr(test, mockall::automock)]
pub trait BlockDevice {
    /// Sector size in bytes (always > 0)
    fn block_size(&self) -> usize;

    /// Identity used in error reports
    fn name(&self) -> &str;

    /// Write `buf` starting at block `offset_blocks`
    fn write_blocks(&mut self, offset_blocks: u64, buf: &[u8]) -> io::Result<()>;

    /// Fill `buf` from block `offset_blocks`
    fn read_blocks(&mut self, offset_blocks: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Flush pending writes to the medium
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_blocks(&mut self, offset_blocks: u64, buf: &[u8]) -> io::Result<()> {
        (**self).write_blocks(offset_blocks, buf)
    }

    fn read_blocks(&mut self, offset_blocks: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_blocks(offset_blocks, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Seekable stream that can commit buffered writes to stable storage
pub trait Medium: Read + Write + Seek {
    /// Push every write so far down to the storage itself
    fn commit(&mut self) -> io::Result<()>;
}

impl Medium for File {
    fn commit(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl<T> Medium for io::Cursor<T>
where
    io::Cursor<T>: Read + Write,
    T: AsRef<[u8]>,
{
    fn commit(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Block device backed by a seekable stream
pub struct StreamBlockDevice<T> {
    inner: T,
    name: String,
    block_size: usize,
}

impl<T: Medium> StreamBlockDevice<T> {
    /// Wrap a stream as a block device
    ///
    /// Fails with `InvalidInput` when `block_size` is zero.
    pub fn new(inner: T, name: impl Into<String>, block_size: usize) -> io::Result<Self> {
        if block_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "block size must be positive",
            ));
        }
        Ok(Self {
            inner,
            name: name.into(),
            block_size,
        })
    }

    /// Consume the device and return the underlying stream
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Borrow the underlying stream
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    fn check_aligned(&self, len: usize) -> io::Result<()> {
        if len % self.block_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "buffer of {} bytes is not a multiple of the {} byte block size",
                    len, self.block_size
                ),
            ));
        }
        Ok(())
    }

    fn seek_to(&mut self, offset_blocks: u64) -> io::Result<()> {
        let offset = offset_blocks
            .checked_mul(self.block_size as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block offset overflow"))?;
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl StreamBlockDevice<File> {
    /// Open an existing device node or image file for block access
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        tracing::debug!("Opened {:?} with block size {}", path, block_size);
        Self::new(file, path.display().to_string(), block_size)
    }
}

impl<T: Medium> BlockDevice for StreamBlockDevice<T> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write_blocks(&mut self, offset_blocks: u64, buf: &[u8]) -> io::Result<()> {
        self.check_aligned(buf.len())?;
        self.seek_to(offset_blocks)?;
        self.inner.write_all(buf)
    }

    fn read_blocks(&mut self, offset_blocks: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check_aligned(buf.len())?;
        self.seek_to(offset_blocks)?;
        self.inner.read_exact(buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.commit()
    }
}
