//! Error types shared across the MediaForge workspace

use thiserror::Error;

/// The main error type for MediaForge operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading or writing an image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid image format or corrupted data
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Unsupported format or feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// File, track, or tape file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested tag is not present in the image
    #[error("Tag not present: {0}")]
    TagNotPresent(String),

    /// No format plugin matches the requested specifier
    #[error("No format matches '{0}'")]
    UnknownFormat(String),

    /// More than one format plugin matches the requested specifier
    #[error("Format specifier '{0}' is ambiguous")]
    AmbiguousFormat(String),

    /// Destination format cannot store the source media type
    #[error("Format {format} does not support media type {media}")]
    IncompatibleMedia { format: String, media: String },

    /// Output path already exists
    #[error("Output already exists: {0}")]
    OutputExists(String),

    /// Conversion would discard data the destination cannot store
    #[error("Converting would lose {0}, not continuing")]
    DataLoss(String),

    /// Long sector read returned a length that is not a whole number of raw sectors
    #[error("Long read at LBA {lba} returned {actual} bytes, not a multiple of {expected}")]
    SectorSizeMismatch { lba: u64, expected: u32, actual: u64 },

    /// Write error on the destination image
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Run was cancelled between chunks
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),
}

/// Result type alias for MediaForge operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a custom error from a string
    pub fn custom(msg: impl Into<String>) -> Self {
        Error::Custom(msg.into())
    }

    /// Create an invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Error::InvalidImage(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a tag not present error
    pub fn tag_not_present(msg: impl Into<String>) -> Self {
        Error::TagNotPresent(msg.into())
    }

    /// Create a data loss error naming the offending tag
    pub fn data_loss(msg: impl Into<String>) -> Self {
        Error::DataLoss(msg.into())
    }

    /// Create a write failure error
    pub fn write_failure(msg: impl Into<String>) -> Self {
        Error::WriteFailure(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }
}
