use bitflags::bitflags;

#[cfg(unix)]
mod posix;

#[cfg(unix)]
pub use self::posix::*;

bitflags! {
    /// Unix mode bits given to newly created shared memory objects.
    pub struct Permissions: u32 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;

        const OWNER_RW = Self::OWNER_READ.bits | Self::OWNER_WRITE.bits;
        const GROUP_RW = Self::GROUP_READ.bits | Self::GROUP_WRITE.bits;
        const OTHER_RW = Self::OTHER_READ.bits | Self::OTHER_WRITE.bits;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::OWNER_RW
    }
}

#[test]
fn test_permissions() {
    assert_eq!(Permissions::default().bits(), 0o600);
    assert_eq!((Permissions::OWNER_RW | Permissions::GROUP_READ).bits(), 0o640);
    assert_eq!(Permissions::from_bits_truncate(0o7777).bits(), 0o666);
}
