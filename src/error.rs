//! Error type shared by the storage and indexing structures.

use std::fmt;
use std::io;

//-----------------------------------------------------------------------------

/// Errors reported by genostore.
///
/// None of the errors are transient: an operation that fails will fail again with the same arguments.
#[derive(Debug)]
pub enum Error {
    /// Malformed or out-of-range caller input, including requests that exceed an addressing limit.
    InvalidArgument(String),
    /// A required token is missing from a parsed record or header.
    MalformedInput(String),
    /// An internal invariant was violated.
    IllegalState(String),
    /// The operation is not supported by an immutable structure.
    UnsupportedOperation(String),
    /// I/O failure while reading or writing files.
    Io(io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    MalformedInput,
    IllegalState,
    UnsupportedOperation,
    Io,
}

impl Error {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::IllegalState(_) => ErrorKind::IllegalState,
            Error::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedInput(msg.into())
    }

    pub(crate) fn illegal_state<S: Into<String>>(msg: S) -> Self {
        Error::IllegalState(msg.into())
    }

    pub(crate) fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedOperation(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
            Error::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Error::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Result type used throughout genostore.
pub type Result<T> = std::result::Result<T, Error>;

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
