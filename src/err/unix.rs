use super::Error;

use std::fmt;
use std::io;

/// Raw `errno` value captured right after a failing libc call.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct ErrCode(i32);

impl ErrCode {
    pub fn last_error() -> Self {
        ErrCode(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    pub fn is_permission(self) -> bool {
        self == PERMISSION_DENIED || self == OPERATION_NOT_PERMITTED
    }

    /// Classifies a failed create/open/map call on the object `name`.
    pub(crate) fn into_error(self, op: &'static str, name: &str) -> Error {
        let name = name.to_string();
        match self {
            NO_SUCH_FILE_OR_DIRECTORY => Error::NotFound { name },
            FILE_EXISTS => Error::AlreadyExists { name },
            ec if ec.is_permission() => Error::PermissionDenied {
                op,
                name,
                source: ec.into(),
            },
            ec => Error::AllocationFailed {
                op,
                name,
                source: ec.into(),
            },
        }
    }
}

impl fmt::Debug for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl From<ErrCode> for io::Error {
    fn from(ec: ErrCode) -> Self {
        io::Error::from_raw_os_error(ec.0)
    }
}

pub const FILE_EXISTS: ErrCode = ErrCode(libc::EEXIST);
pub const PERMISSION_DENIED: ErrCode = ErrCode(libc::EACCES);
pub const OPERATION_NOT_PERMITTED: ErrCode = ErrCode(libc::EPERM);
pub const NO_SUCH_FILE_OR_DIRECTORY: ErrCode = ErrCode(libc::ENOENT);
pub const INVALID_ARGUMENT: ErrCode = ErrCode(libc::EINVAL);

#[test]
fn test_errcode() {
    assert_eq!(FILE_EXISTS, ErrCode(libc::EEXIST));
    assert!(PERMISSION_DENIED.is_permission());
    assert!(OPERATION_NOT_PERMITTED.is_permission());
    assert!(!FILE_EXISTS.is_permission());
}

#[test]
fn test_errcode_classification() {
    match NO_SUCH_FILE_OR_DIRECTORY.into_error("shm_open", "/k") {
        Error::NotFound { name } => assert_eq!(name, "/k"),
        err => panic!("unexpected {:?}", err),
    }
    match FILE_EXISTS.into_error("shm_open", "/k") {
        Error::AlreadyExists { .. } => {}
        err => panic!("unexpected {:?}", err),
    }
    match PERMISSION_DENIED.into_error("shm_open", "/k") {
        Error::PermissionDenied { op, .. } => assert_eq!(op, "shm_open"),
        err => panic!("unexpected {:?}", err),
    }
    match INVALID_ARGUMENT.into_error("mmap", "/k") {
        Error::AllocationFailed { op, source, .. } => {
            assert_eq!(op, "mmap");
            assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
        }
        err => panic!("unexpected {:?}", err),
    }
}
