use super::Permissions;
use crate::err::ErrCode;

use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

/// Identifies one shared memory object independent of its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    dev: u64,
    ino: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct Status {
    pub size: usize,
    pub identity: Identity,
}

/// Close descriptor on exit scope.
#[derive(Debug)]
pub struct Handle(RawFd);

impl Handle {
    pub(crate) fn from_raw(fd: RawFd) -> Self {
        Handle(fd)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }

    pub fn status(&self) -> Result<Status, ErrCode> {
        let mut st = MaybeUninit::<libc::stat>::uninit();
        match unsafe { libc::fstat(self.0, st.as_mut_ptr()) } {
            -1 => Err(ErrCode::last_error()),
            _ => {
                let st = unsafe { st.assume_init() };
                Ok(Status {
                    size: st.st_size.max(0) as usize,
                    identity: Identity {
                        dev: st.st_dev as u64,
                        ino: st.st_ino as u64,
                    },
                })
            }
        }
    }

    pub fn truncate(&self, size: usize) -> Result<(), ErrCode> {
        match unsafe { libc::ftruncate(self.0, size as libc::off_t) } {
            -1 => Err(ErrCode::last_error()),
            _ => Ok(()),
        }
    }

    /// Applies `perm` verbatim, so the process umask cannot narrow it.
    pub fn chmod(&self, perm: Permissions) -> Result<(), ErrCode> {
        match unsafe { libc::fchmod(self.0, perm.bits() as libc::mode_t) } {
            -1 => Err(ErrCode::last_error()),
            _ => Ok(()),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}
