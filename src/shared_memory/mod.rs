use crate::ffi::Handle;

/// A named shared memory object opened read-write by this process.
///
/// Dropping it closes the descriptor; the name stays in the OS namespace
/// until `remove` is called.
#[derive(Debug)]
pub struct SharedMemoryObject {
    handle: Handle,
}

#[cfg(unix)]
mod posix;
