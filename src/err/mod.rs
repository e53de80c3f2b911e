use std::io;
use std::path::PathBuf;

#[cfg(unix)]
pub use self::unix::*;

#[cfg(unix)]
mod unix;

/// Result alias for segment operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything the segment manager can report back to its caller.
///
/// OS failures keep the failing call and the resolved object name next to
/// the underlying `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid segment key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid segment size {size}: {reason}")]
    InvalidSize { size: usize, reason: &'static str },

    #[error("shared memory `{name}` does not exist")]
    NotFound { name: String },

    #[error("shared memory `{name}` already exists")]
    AlreadyExists { name: String },

    #[error("shared memory `{name}` has {actual} bytes, {requested} requested")]
    SizeMismatch {
        name: String,
        requested: usize,
        actual: usize,
    },

    #[error("{op} failed for `{name}`: {source}")]
    AllocationFailed {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("shm_unlink failed for `{name}`: {source}")]
    RemovalFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} not permitted for `{name}`: {source}")]
    PermissionDenied {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{len} bytes at offset {offset} exceed segment length {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("cannot read configuration {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[test]
fn test_error_display() {
    let err = Error::SizeMismatch {
        name: "/seg-b".to_string(),
        requested: 40,
        actual: 20,
    };
    assert_eq!(err.to_string(), "shared memory `/seg-b` has 20 bytes, 40 requested");
    assert!(!err.is_not_found());
    assert!(Error::NotFound { name: "/x".to_string() }.is_not_found());
}
