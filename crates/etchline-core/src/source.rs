//! Image sources
//!
//! This module opens the byte stream that gets imaged onto a device:
//! - Local uncompressed files (ISO, IMG, raw)
//! - Compressed files (gzip, xz, zstd, bzip2), decompressed on the fly
//!
//! It also provides [`CancellableReader`], which is how a caller injects
//! cancellation into the otherwise uninterruptible write loop.
//!
//! ## Example
//!
//! ```no_run
//! use etchline_core::source::Source;
//!
//! let source = Source::open("image.img.xz")?;
//! println!("Size: {:?}", source.info().size);
//! # Ok::<(), etchline_core::Error>(())
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Source Types and Detection
// ============================================================================

/// Source type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Local uncompressed file
    LocalFile,
    /// Gzip compressed (.gz)
    Gzip,
    /// XZ compressed (.xz)
    Xz,
    /// Zstandard compressed (.zst)
    Zstd,
    /// Bzip2 compressed (.bz2)
    Bzip2,
}

impl SourceType {
    /// Check if this source type is compressed
    pub fn is_compressed(&self) -> bool {
        !matches!(self, SourceType::LocalFile)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            SourceType::LocalFile => "local file",
            SourceType::Gzip => "gzip compressed",
            SourceType::Xz => "xz compressed",
            SourceType::Zstd => "zstd compressed",
            SourceType::Bzip2 => "bzip2 compressed",
        }
    }
}

/// Detect source type from the file extension
pub fn detect_source_type(path: &str) -> SourceType {
    let lower = path.to_lowercase();
    if lower.ends_with(".gz") || lower.ends_with(".gzip") {
        SourceType::Gzip
    } else if lower.ends_with(".xz") {
        SourceType::Xz
    } else if lower.ends_with(".zst") || lower.ends_with(".zstd") {
        SourceType::Zstd
    } else if lower.ends_with(".bz2") || lower.ends_with(".bzip2") {
        SourceType::Bzip2
    } else {
        SourceType::LocalFile
    }
}

/// Detect compression type from magic bytes
pub fn detect_compression_from_magic(bytes: &[u8]) -> Option<SourceType> {
    match bytes {
        [0x1f, 0x8b, ..] => Some(SourceType::Gzip),
        [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, ..] => Some(SourceType::Xz),
        [0x28, 0xb5, 0x2f, 0xfd, ..] => Some(SourceType::Zstd),
        [0x42, 0x5a, 0x68, ..] => Some(SourceType::Bzip2),
        _ => None,
    }
}

// ============================================================================
// Source
// ============================================================================

/// Information about an opened source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Path as given
    pub path: String,

    /// Detected type
    pub source_type: SourceType,

    /// Size of the image stream in bytes, if known without decompressing
    pub size: Option<u64>,

    /// Size of the file on disk
    pub file_size: u64,
}

/// An image stream ready to be written
pub struct Source {
    info: SourceInfo,
    reader: Box<dyn Read + Send>,
}

impl Source {
    /// Open a source, detecting compression from the extension
    pub fn open(path: &str) -> Result<Self> {
        let source_type = detect_source_type(path);
        let mut file = open_file(path)?;
        if source_type == SourceType::LocalFile {
            warn_if_compressed(&mut file, path)?;
        }
        let file_size = file.metadata()?.len();

        let size = (!source_type.is_compressed()).then_some(file_size);
        let info = SourceInfo {
            path: path.to_string(),
            source_type,
            size,
            file_size,
        };

        let reader = open_reader(file, source_type)?;
        tracing::debug!("Opened source {} ({})", path, source_type.description());

        Ok(Self { info, reader })
    }

    /// Wrap an arbitrary stream
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        path: impl Into<String>,
        size: Option<u64>,
    ) -> Self {
        Self {
            info: SourceInfo {
                path: path.into(),
                source_type: SourceType::LocalFile,
                size,
                file_size: size.unwrap_or(0),
            },
            reader: Box::new(reader),
        }
    }

    /// Get source information
    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Known length of the image stream
    pub fn size(&self) -> Option<u64> {
        self.info.size
    }

    /// Fail every later read once `cancelled` is set
    pub fn cancellable(self, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            info: self.info,
            reader: Box::new(CancellableReader::new(self.reader, cancelled)),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").field("info", &self.info).finish()
    }
}

fn open_file(path: &str) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::SourceNotFound(path.to_string())
        } else {
            Error::Io(e)
        }
    })
}

/// Plain images that start with a compression magic were probably renamed
fn warn_if_compressed(file: &mut File, path: &str) -> Result<()> {
    let mut magic = Vec::with_capacity(6);
    Read::by_ref(file).take(6).read_to_end(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if let Some(source_type) = detect_compression_from_magic(&magic) {
        tracing::warn!(
            "{} looks {} but has no matching extension, writing it as-is",
            path,
            source_type.description()
        );
    }
    Ok(())
}

#[cfg(feature = "compression")]
fn open_reader(file: File, source_type: SourceType) -> Result<Box<dyn Read + Send>> {
    let buffered = BufReader::with_capacity(64 * 1024, file);
    Ok(match source_type {
        SourceType::LocalFile => Box::new(buffered),
        SourceType::Gzip => Box::new(flate2::read::MultiGzDecoder::new(buffered)),
        SourceType::Xz => Box::new(xz2::read::XzDecoder::new(buffered)),
        SourceType::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(buffered)?),
        SourceType::Bzip2 => Box::new(bzip2::read::BzDecoder::new(buffered)),
    })
}

#[cfg(not(feature = "compression"))]
fn open_reader(file: File, source_type: SourceType) -> Result<Box<dyn Read + Send>> {
    match source_type {
        SourceType::LocalFile => Ok(Box::new(BufReader::with_capacity(64 * 1024, file))),
        _ => Err(Error::InvalidConfig(
            "Compression support not enabled. Rebuild with 'compression' feature.".to_string(),
        )),
    }
}

/// Check that a source path exists and is a file
pub fn validate_source(path: &str) -> Result<SourceInfo> {
    let file_path = Path::new(path);
    if !file_path.is_file() {
        return Err(Error::SourceNotFound(path.to_string()));
    }
    Source::open(path).map(|s| s.info)
}

// ============================================================================
// Cancellation
// ============================================================================

/// Marker carried inside the `io::Error` of a cancelled read
#[derive(Debug)]
struct ReadCancelled;

impl fmt::Display for ReadCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("read cancelled")
    }
}

impl std::error::Error for ReadCancelled {}

/// Whether an I/O error came from a [`CancellableReader`]
pub fn is_cancellation(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<ReadCancelled>())
}

/// Reader that fails every read once its flag is set
///
/// The writer turns that failure into [`Error::Cancelled`].
pub struct CancellableReader<R> {
    inner: R,
    cancelled: Arc<AtomicBool>,
}

impl<R: Read> CancellableReader<R> {
    /// Wrap `inner`, cancelling once `cancelled` becomes true
    pub fn new(inner: R, cancelled: Arc<AtomicBool>) -> Self {
        Self { inner, cancelled }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(io::Error::other(ReadCancelled));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_detect_source_type() {
        assert_eq!(detect_source_type("image.img"), SourceType::LocalFile);
        assert_eq!(detect_source_type("/tmp/debian.iso"), SourceType::LocalFile);
        assert_eq!(detect_source_type("image.img.gz"), SourceType::Gzip);
        assert_eq!(detect_source_type("IMAGE.IMG.XZ"), SourceType::Xz);
        assert_eq!(detect_source_type("image.zst"), SourceType::Zstd);
        assert_eq!(detect_source_type("image.bz2"), SourceType::Bzip2);
    }

    #[test]
    fn test_source_type_is_compressed() {
        assert!(!SourceType::LocalFile.is_compressed());
        assert!(SourceType::Gzip.is_compressed());
        assert!(SourceType::Xz.is_compressed());
        assert!(SourceType::Zstd.is_compressed());
        assert!(SourceType::Bzip2.is_compressed());
    }

    #[test]
    fn test_detect_compression_from_magic() {
        assert_eq!(
            detect_compression_from_magic(&[0x1f, 0x8b, 0x08, 0, 0, 0]),
            Some(SourceType::Gzip)
        );
        assert_eq!(
            detect_compression_from_magic(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            Some(SourceType::Xz)
        );
        assert_eq!(
            detect_compression_from_magic(&[0x28, 0xb5, 0x2f, 0xfd]),
            Some(SourceType::Zstd)
        );
        assert_eq!(
            detect_compression_from_magic(b"BZh91AY"),
            Some(SourceType::Bzip2)
        );
        assert_eq!(detect_compression_from_magic(b"\x00\x00"), None);
        assert_eq!(detect_compression_from_magic(&[]), None);
    }

    #[test]
    fn test_open_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x42u8; 3000]).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let mut source = Source::open(&path).unwrap();
        assert_eq!(source.size(), Some(3000));
        assert_eq!(source.info().source_type, SourceType::LocalFile);

        let mut data = Vec::new();
        source.read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![0x42u8; 3000]);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_open_gzip_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("image.img.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(&[7u8; 10_000]).unwrap();
        encoder.finish().unwrap();

        let mut source = Source::open(&path.to_string_lossy()).unwrap();
        assert_eq!(source.info().source_type, SourceType::Gzip);
        assert_eq!(source.size(), None);

        let mut data = Vec::new();
        source.read_to_end(&mut data).unwrap();
        assert_eq!(data.len(), 10_000);
    }

    #[test]
    fn test_source_not_found() {
        let result = Source::open("/nonexistent/image.img");
        assert!(matches!(result, Err(Error::SourceNotFound(_))));

        let result = validate_source("/nonexistent/image.img");
        assert!(matches!(result, Err(Error::SourceNotFound(_))));
    }

    #[test]
    fn test_from_reader() {
        let source = Source::from_reader(Cursor::new(vec![1, 2, 3]), "memory", Some(3));
        assert_eq!(source.size(), Some(3));
        assert_eq!(source.info().path, "memory");
    }

    #[test]
    fn test_cancellable_reader() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut reader = CancellableReader::new(Cursor::new(vec![0u8; 16]), flag.clone());

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 8);

        flag.store(true, Ordering::SeqCst);
        let err = reader.read(&mut buf).unwrap_err();
        assert!(is_cancellation(&err));
    }

    #[test]
    fn test_cancellable_source_keeps_info() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut source =
            Source::from_reader(Cursor::new(vec![0u8; 4]), "memory", Some(4)).cancellable(flag);

        assert_eq!(source.size(), Some(4));
        let mut buf = [0u8; 4];
        assert!(is_cancellation(&source.read(&mut buf).unwrap_err()));
    }

    #[test]
    fn test_other_errors_are_not_cancellation() {
        assert!(!is_cancellation(&io::Error::other("boom")));
        assert!(!is_cancellation(&io::Error::from(io::ErrorKind::Interrupted)));
    }
}
