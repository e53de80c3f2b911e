use super::adjust_page_offset;
use crate::err::{ErrCode, INVALID_ARGUMENT};
use crate::ffi::Handle;

use std::ptr;

/// A read-write `MAP_SHARED` mapping of a whole shared memory object.
///
/// The mapping outlives the descriptor it was created from and is unmapped
/// on drop.
#[derive(Debug)]
pub struct MappedRegion {
    base: *mut libc::c_void,
    size: usize,
}

impl MappedRegion {
    pub fn new(handle: &Handle, size: usize) -> Result<Self, ErrCode> {
        if size == 0 {
            return Err(INVALID_ARGUMENT);
        }

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                handle.raw(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(ErrCode::last_error());
        }
        Ok(MappedRegion { base, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base as *const u8
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base as *mut u8
    }

    /// `msync`s `len` bytes starting at `offset`; `len == 0` means to the end.
    pub fn flush(&self, offset: usize, mut len: usize) -> Result<(), ErrCode> {
        if offset > self.size || len > self.size - offset {
            return Err(INVALID_ARGUMENT);
        }
        if len == 0 {
            len = self.size - offset;
        }
        let page_offset = adjust_page_offset(offset);
        match unsafe {
            libc::msync(
                self.base.add(offset - page_offset),
                len + page_offset,
                libc::MS_SYNC,
            )
        } {
            -1 => Err(ErrCode::last_error()),
            _ => Ok(()),
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base, self.size);
        }
    }
}

// The mapping is process-wide memory, not tied to the creating thread.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

#[test]
fn test_mapped_region() {
    use crate::ffi::Permissions;
    use crate::shared_memory::SharedMemoryObject;
    use std::ffi::CString;

    let name = CString::new(format!("/shmu{}mr", std::process::id())).unwrap();
    let _ = SharedMemoryObject::remove(&name);
    let shm = SharedMemoryObject::create(&name, Permissions::default()).unwrap();
    shm.truncate(4096).unwrap();

    let first = MappedRegion::new(shm.handle(), 4096).unwrap();
    let second = MappedRegion::new(shm.handle(), 4096).unwrap();
    drop(shm);

    assert_eq!(first.size(), 4096);
    unsafe {
        assert_eq!(*first.as_ptr().add(4095), 0);
        *first.as_mut_ptr().add(10) = 0x41;
        assert_eq!(*second.as_ptr().add(10), 0x41);
    }
    first.flush(10, 1).unwrap();
    first.flush(0, 0).unwrap();
    assert_eq!(first.flush(4000, 200), Err(INVALID_ARGUMENT));

    SharedMemoryObject::remove(&name).unwrap();
}

#[test]
fn test_mapped_region_empty() {
    use crate::ffi::Permissions;
    use crate::shared_memory::SharedMemoryObject;
    use std::ffi::CString;

    let name = CString::new(format!("/shmu{}me", std::process::id())).unwrap();
    let _ = SharedMemoryObject::remove(&name);
    let shm = SharedMemoryObject::create(&name, Permissions::default()).unwrap();
    assert_eq!(MappedRegion::new(shm.handle(), 0).err(), Some(INVALID_ARGUMENT));
    SharedMemoryObject::remove(&name).unwrap();
}
