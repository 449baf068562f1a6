use manifest::ManifestError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    /// Bad magic or version, truncated sections, or records that point
    /// outside their tables.
    #[error("invalid bundle format: {0}")]
    Format(String),

    /// The sizes declared in the header do not add up to the file length.
    /// Both values count whole-file bytes, header included.
    #[error("bundle size mismatch: header declares a {expected}-byte bundle, file is {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("no asset with identifier {0:?} in the bundle")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A file listed in a manifest could not be read while packing.
    #[error("failed to read {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("buffer too small: need {needed} bytes, got {provided}")]
    BufferTooSmall { needed: usize, provided: usize },

    /// The bundle owning the file handle has been closed.
    #[error("bundle file handle is closed")]
    HandleClosed,

    #[error("{what} exceeds the format limit ({value} > {max})")]
    Limit {
        what: &'static str,
        value: u64,
        max: u64,
    },

    #[error("asset {0:?} is declared more than once")]
    DuplicateAsset(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

pub type Result<T> = std::result::Result<T, BundleError>;

/// Shorthand for building a [`BundleError::Format`].
pub(crate) fn format_err(msg: impl Into<String>) -> BundleError {
    BundleError::Format(msg.into())
}
