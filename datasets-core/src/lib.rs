#![deny(missing_docs)]
//! Shared machinery behind remotely hosted tabular datasets.
//!
//! A dataset goes through four stages before a consumer sees a single row:
//!
//! 1. [`cache::DataHome`] maps the dataset name to a directory under the cache root.
//! 2. [`fetch::Fetcher`] downloads the artifact there, once, and checks its size.
//! 3. [`extract::ensure_extracted`] unpacks the data file if the artifact is an archive.
//! 4. [`stream::stream`] turns the data file into a lazy sequence of [`stream::Record`].
//!
//! Every stage is idempotent, so running the whole chain again on a warm cache
//! costs a few `stat` calls and opens a fresh file handle.
use std::path::PathBuf;
use thiserror::Error;

pub mod cache;
pub mod extract;
pub mod fetch;
pub mod stream;

pub use cache::{DataHome, DATA_HOME_ENV};
pub use extract::{ensure_extracted, refresh_extracted, ArchiveKind};
pub use fetch::{Fetcher, FetcherBuilder, HttpTransport, Transport};
pub use stream::{stream, Converter, Features, Record, RecordStream, Records, StreamConfig, Value};

/// Boxed error used as the source of download failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Error type for datasets
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The cache root or a dataset identifier is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transfer failed: transport error, timeout or non-success status.
    #[error("download of {url} failed: {source}")]
    Download {
        /// Remote location that was requested.
        url: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The downloaded byte count does not match the declared size.
    #[error("integrity check failed for {path}: expected {expected} bytes, received {actual}")]
    Integrity {
        /// Destination that was not written.
        path: PathBuf,
        /// Declared size.
        expected: u64,
        /// Size actually received.
        actual: u64,
    },

    /// The archive is unreadable or does not contain the requested member.
    #[error("cannot extract {path}: {reason}")]
    Extraction {
        /// Archive being extracted.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A row of the data file could not be turned into a record.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number, the header being line 1.
        line: u64,
        /// What went wrong.
        message: String,
    },

    /// Local filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    pub(crate) fn download<E: Into<BoxError>>(url: &str, source: E) -> Self {
        Self::Download {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn extraction<E: ToString>(path: &std::path::Path, reason: E) -> Self {
        Self::Extraction {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// The default trait to implement to get the simplest API
pub trait Dataset {
    /// The type of objects contained in the dataset
    type Item;

    /// Iterator produced by a single pass over the dataset.
    type Iter: Iterator<Item = Result<Self::Item>>;

    /// Starts a new pass. Every call yields an independent iterator that
    /// begins at the first item.
    fn iter(&self) -> Result<Self::Iter>;

    /// Declared number of items. This is informational and is not checked
    /// against the actual content.
    fn n_samples(&self) -> usize;
}
