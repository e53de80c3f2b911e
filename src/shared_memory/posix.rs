use super::*;
use crate::err::{ErrCode, NO_SUCH_FILE_OR_DIRECTORY};
use crate::ffi::{Handle, Permissions, Status};

use std::ffi::CStr;

#[cfg(target_os = "macos")]
fn mode_arg(perm: Permissions) -> libc::c_uint {
    perm.bits() as libc::c_uint
}

#[cfg(not(target_os = "macos"))]
fn mode_arg(perm: Permissions) -> libc::mode_t {
    perm.bits() as libc::mode_t
}

fn shm_open(name: &CStr) -> Result<Handle, ErrCode> {
    match unsafe { libc::shm_open(name.as_ptr(), libc::O_RDWR, mode_arg(Permissions::empty())) } {
        -1 => Err(ErrCode::last_error()),
        fd => Ok(Handle::from_raw(fd)),
    }
}

fn shm_create(name: &CStr, perm: Permissions) -> Result<Handle, ErrCode> {
    match unsafe {
        libc::shm_open(
            name.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            mode_arg(perm),
        )
    } {
        -1 => Err(ErrCode::last_error()),
        fd => {
            let handle = Handle::from_raw(fd);
            if let Err(ec) = handle.chmod(perm) {
                drop(handle);
                unsafe {
                    libc::shm_unlink(name.as_ptr());
                }
                return Err(ec);
            }
            Ok(handle)
        }
    }
}

impl SharedMemoryObject {
    /// Creates `name`, failing with `EEXIST` if it is already present.
    pub fn create(name: &CStr, perm: Permissions) -> Result<Self, ErrCode> {
        shm_create(name, perm).map(|handle| SharedMemoryObject { handle })
    }

    pub fn open(name: &CStr) -> Result<Self, ErrCode> {
        shm_open(name).map(|handle| SharedMemoryObject { handle })
    }

    /// Unlinks `name`. `Ok(false)` means nothing was there.
    pub fn remove(name: &CStr) -> Result<bool, ErrCode> {
        match unsafe { libc::shm_unlink(name.as_ptr()) } {
            0 => Ok(true),
            _ => match ErrCode::last_error() {
                NO_SUCH_FILE_OR_DIRECTORY => Ok(false),
                ec => Err(ec),
            },
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn status(&self) -> Result<Status, ErrCode> {
        self.handle.status()
    }

    pub fn truncate(&self, size: usize) -> Result<(), ErrCode> {
        self.handle.truncate(size)
    }
}

#[cfg(test)]
fn test_name(tag: &str) -> std::ffi::CString {
    std::ffi::CString::new(format!("/shmu{}{}", std::process::id(), tag)).unwrap()
}

#[test]
fn test_create_and_remove() {
    let name = test_name("cr");
    let _ = SharedMemoryObject::remove(&name);

    let obj = SharedMemoryObject::create(&name, Permissions::default()).unwrap();
    obj.truncate(4096).unwrap();
    assert_eq!(obj.status().unwrap().size, 4096);

    assert_eq!(SharedMemoryObject::remove(&name), Ok(true));
    assert_eq!(SharedMemoryObject::remove(&name), Ok(false));
}

#[test]
fn test_create_exclusive() {
    let name = test_name("ex");
    let _ = SharedMemoryObject::remove(&name);

    let first = SharedMemoryObject::create(&name, Permissions::default()).unwrap();
    let second = SharedMemoryObject::create(&name, Permissions::default());
    assert_eq!(second.err(), Some(crate::err::FILE_EXISTS));

    let reopened = SharedMemoryObject::open(&name).unwrap();
    assert_eq!(
        first.status().unwrap().identity,
        reopened.status().unwrap().identity
    );
    SharedMemoryObject::remove(&name).unwrap();
}

#[test]
fn test_open_missing() {
    let name = test_name("mi");
    let _ = SharedMemoryObject::remove(&name);
    assert_eq!(
        SharedMemoryObject::open(&name).err(),
        Some(NO_SUCH_FILE_OR_DIRECTORY)
    );
}
