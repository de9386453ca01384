//! Error Types
//!
//! Typed errors for the stream layer and the state format, built with `thiserror`.
//!
//! # Error Categories
//! - **Stream errors**: short reads, failed writes, unsupported seeks, size limits
//! - **State errors**: malformed headers or sections, missing module support
//!
//! Format drift between module revisions (unknown sections, resized variables)
//! is not an error; it is reported through [`crate::state::StateWarning`].

use thiserror::Error;

/// Failures raised by [`crate::Stream`] implementations.
///
/// Streams fail fast: a write either persists every byte or returns an error,
/// and a read that cannot be satisfied returns [`StreamError::UnexpectedEof`]
/// unless the caller opted into short reads.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Underlying OS-level I/O failure (disk full, permission denied, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream reached before the requested byte count was read.
    #[error("unexpected end of stream: requested {requested} bytes, got {read}")]
    UnexpectedEof { requested: u64, read: u64 },

    /// A seek resolved to a negative absolute position.
    #[error("attempted to seek before start of stream")]
    SeekBeforeStart,

    /// A seek offset could not be represented.
    #[error("seek offset overflow")]
    SeekOverflow,

    /// The stream cannot seek at all.
    #[error("stream is not seekable")]
    NotSeekable,

    /// The stream can seek, but only slowly, and the caller required fast seeks.
    #[error("stream is not fast-seekable")]
    NotFastSeekable,

    /// The stream was not opened for reading.
    #[error("stream is not readable")]
    NotReadable,

    /// The stream was not opened for writing.
    #[error("stream is not writeable")]
    NotWriteable,

    /// Draining a stream into memory would exceed the caller's limit.
    #[error("stream size exceeds limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    /// The data does not fit in the address space of this process.
    #[error("stream of {0} bytes is too large for memory")]
    TooLarge(u64),

    /// Operation on a stream after `close()`.
    #[error("stream is closed")]
    Closed,
}

impl StreamError {
    /// Whether this error means "ran out of data" rather than a real I/O fault.
    pub fn is_eof(&self) -> bool {
        match self {
            StreamError::UnexpectedEof { .. } => true,
            StreamError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Failures of the state serialization engine.
#[derive(Error, Debug)]
pub enum StateError {
    /// Stream failure while reading or writing state data.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The data does not start with the state file magic.
    #[error("not a save state (bad magic)")]
    BadMagic,

    /// The header announces more payload than the stream holds.
    #[error("save state is truncated: expected {expected} payload bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// A section header or its declared length is inconsistent with the payload.
    #[error("malformed section at payload offset {offset}: {message}")]
    MalformedSection { offset: u64, message: String },

    /// A variable entry inside a section runs past the section end.
    #[error("malformed variable entry in section \"{section}\"")]
    MalformedVariable { section: String },

    /// A section or variable name does not fit the on-disk field.
    #[error("state name \"{name}\" is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },

    /// The same section name was emitted twice during one save.
    #[error("duplicate state section \"{0}\"")]
    DuplicateSection(String),

    /// A section or payload grew past the 32-bit length field.
    #[error("state section \"{0}\" exceeds 4 GiB")]
    SectionTooLarge(String),

    /// The active module cannot describe its state.
    #[error("module \"{module}\" doesn't support save states")]
    Unsupported { module: String },

    /// Data-only loads require an exact layout match.
    #[error("data-only state layout mismatch: {0}")]
    LayoutMismatch(String),

    /// Compressing or decompressing a stored state failed.
    #[error("state compression error: {0}")]
    Compression(String),
}

impl StateError {
    /// Create a malformed section error.
    #[cold]
    pub fn malformed_section(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedSection {
            offset,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StateError {
    #[cold] // Error paths are cold
    fn from(err: std::io::Error) -> Self {
        StateError::Stream(StreamError::Io(err))
    }
}
