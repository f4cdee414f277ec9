//! # Etchline Core
//!
//! Core library for writing disk images onto block devices one block-aligned
//! chunk at a time and reporting a single weighted progress value across the
//! steps of an imaging job.
//!
//! ## Modules
//!
//! - `writer`: Block-aligned streaming writer with zero padding of the last block
//! - `progress`: Weighted multi-step progress aggregation and update sinks
//! - `procedure`: Job procedures, steps and their lookup
//! - `job`: Runs a procedure against an image and a device
//! - `device`: Block device abstraction
//! - `source`: Plain and compressed image sources, cancellation
//! - `verifier`: Read-back verification and SHA-256 checksums
//! - `wake_lock`: Keeps the host awake while writing
//! - `error`: Error types and result aliases
//! - `config`: Runtime configuration
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```ignore
//! use etchline_core::{JobRunner, ProgressAggregator, Settings, Source, StreamBlockDevice};
//!
//! let settings = Settings::load_from_path(Settings::config_path());
//! let procedure = settings.weights.write_procedure(None, true)?;
//!
//! let mut aggregator = ProgressAggregator::new(1, procedure, |update| {
//!     println!("{:?}", update.percentage);
//! });
//! let mut device = StreamBlockDevice::open("/dev/sdb", 512)?;
//!
//! let report = JobRunner::with_config(settings.write.write_config())
//!     .run(&mut aggregator, 0, || Source::open("image.img.xz"), &mut device)?;
//! println!("Wrote {} bytes in {:?}", report.bytes_written, report.elapsed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod error;
pub mod job;
pub mod procedure;
pub mod progress;
pub mod settings;
pub mod source;
pub mod verifier;
pub mod wake_lock;
pub mod writer;

pub use config::{WriteConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use device::{BlockDevice, Medium, StreamBlockDevice, DEFAULT_SECTOR_SIZE};
pub use error::{Error, IoError, Result, StateError, WriteError};
pub use job::{JobReport, JobRunner};
pub use procedure::{Action, InMemoryProcedures, JobId, Procedure, ProcedureProvider, Step};
pub use progress::{
    AggregatorState, ErrorInfo, ProgressAggregator, ProgressSink, ProgressUpdate, MSG_DONE,
    MSG_FAILED, MSG_RESUMING, MSG_STARTING,
};
pub use settings::{
    parse_size, BehaviorSettings, Settings, SettingsError, WeightSettings, WriteSettings,
};
pub use source::{
    detect_source_type, is_cancellation, validate_source, CancellableReader, Source, SourceInfo,
    SourceType,
};
pub use verifier::{verify_checksum, DeviceVerifier};
#[cfg(feature = "checksum")]
pub use verifier::sha256_hex;
pub use wake_lock::{CountingWakeLock, NoopWakeLock, WakeLock, WakeLockGuard};
pub use writer::BlockWriter;
