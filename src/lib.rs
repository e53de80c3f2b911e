//! Named shared memory segments shared between processes.
//!
//! A segment is a POSIX shared memory object addressed by a string key.
//! [`SegmentManager::create`] allocates and maps one, [`SegmentManager::open`]
//! maps an existing one by key from any process, and
//! [`SegmentManager::remove`] unlinks the name again.
//!
//! ```no_run
//! let manager = shmseg::SegmentManager::default();
//! let mut view = manager.create("seg-a", 1024)?;
//! view.write_at(0, b"hello")?;
//!
//! // Possibly in another process.
//! let view = manager.open("seg-a")?;
//! assert_eq!(&view.to_vec()[..5], b"hello");
//!
//! assert!(manager.remove("seg-a")?);
//! # Ok::<(), shmseg::Error>(())
//! ```
//!
//! Names are not unlinked when a process exits, crashes or drops its
//! manager. Anything that is not removed explicitly stays in the OS
//! namespace (`/dev/shm` on Linux) until reboot.

#[cfg(not(unix))]
compile_error!("shmseg supports POSIX shared memory only");

mod config;
mod err;
mod ffi;
mod key;
mod manager;
mod mapped_region;
mod segment;
mod shared_memory;

pub use self::config::{CreatePolicy, ManagerConfig};
pub use self::err::{Error, Result};
pub use self::ffi::Permissions;
pub use self::key::{SegmentKey, MAX_NAME_LEN};
pub use self::manager::SegmentManager;
pub use self::segment::SegmentView;

use once_cell::sync::Lazy;

static GLOBAL: Lazy<SegmentManager> = Lazy::new(SegmentManager::default);

/// The process-wide manager behind [`create`], [`open`] and [`remove`].
pub fn global() -> &'static SegmentManager {
    &GLOBAL
}

/// Creates `key` with `size` bytes through the [`global`] manager.
pub fn create(key: &str, size: usize) -> Result<SegmentView> {
    global().create(key, size)
}

/// Opens `key` through the [`global`] manager.
pub fn open(key: &str) -> Result<SegmentView> {
    global().open(key)
}

/// Removes `key` through the [`global`] manager.
pub fn remove(key: &str) -> Result<bool> {
    global().remove(key)
}
