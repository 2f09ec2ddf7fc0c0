//! Error types for path, node, and archive operations.
//!
//! All fallible operations in this crate return [`Result<T>`]. The [`Error`]
//! enum is the crate-wide taxonomy: filesystem failures are translated at the
//! [`Node`] boundary (`errno`-style kinds become [`Error::NotFound`],
//! [`Error::AccessDenied`], or stay as [`Error::Io`]), and codec failures are
//! translated where the zip backend is invoked.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipnode::{Node, NodePath, Error};
//!
//! fn stat_size(raw: &str) -> zipnode::Result<u64> {
//!     let path = NodePath::new(raw)?;
//!     let node = Node::resolve(&path)?;
//!     node.size()
//! }
//!
//! match stat_size("/no/such/file") {
//!     Err(Error::NotFound(_)) => {}
//!     other => panic!("expected NotFound, got {:?}", other),
//! }
//! ```
//!
//! [`Node`]: crate::Node

use std::io;

/// The main error type for this crate.
///
/// Operations that fail before any asynchronous work starts return these
/// synchronously; failures inside a queued operation are delivered through
/// the [`Event::Failed`] completion event instead.
///
/// [`Event::Failed`]: crate::operation::Event::Failed
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A path, handle, or archive entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An argument is outside its allowed domain (bad mode string, bad
    /// options, missing virtual permission).
    #[error("invalid value: {0}")]
    InvalidValues(String),

    /// The requested modification conflicts with existing state, e.g. opening
    /// an existing archive for writing with `overwrite` unset.
    #[error("invalid modification: {0}")]
    InvalidModification(String),

    /// The object is not in a state that permits the operation, e.g. a
    /// directory that disappeared between resolution and use.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An OS-level permission check failed.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A raw path string could not be turned into a [`NodePath`].
    ///
    /// [`NodePath`]: crate::NodePath
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The operation was rejected because the handle is closed or busy.
    #[error("service not available: {0}")]
    ServiceNotAvailable(String),

    /// The operation was canceled through [`ArchiveManager::abort`].
    ///
    /// [`ArchiveManager::abort`]: crate::ArchiveManager::abort
    #[error("operation canceled")]
    Canceled,

    /// An I/O error not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A codec-level failure without a more specific mapping.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Translates a filesystem error for `path` into the crate taxonomy.
    ///
    /// `NotFound` and `PermissionDenied` kinds become typed variants; any
    /// other kind stays an [`Error::Io`].
    pub(crate) fn from_fs(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Error::AccessDenied(path.to_string()),
            _ => Error::Io(err),
        }
    }

    /// Returns `true` if this error indicates a missing path, handle, or entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        use zip::result::ZipError;
        match err {
            ZipError::Io(e) => Error::Io(e),
            ZipError::FileNotFound => Error::NotFound("zip entry not found".to_string()),
            other => Error::Unknown(other.to_string()),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
