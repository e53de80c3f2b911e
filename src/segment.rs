use crate::err::{Error, Result};
use crate::ffi::Identity;
use crate::key::SegmentKey;
use crate::mapped_region::MappedRegion;

use std::fmt;
use std::ptr;
use std::sync::Arc;

/// Process-local handle on one mapped segment.
pub(crate) struct Segment {
    key: SegmentKey,
    region: MappedRegion,
    identity: Identity,
    created: bool,
}

impl Segment {
    pub(crate) fn new(key: SegmentKey, region: MappedRegion, identity: Identity, created: bool) -> Self {
        Segment {
            key,
            region,
            identity,
            created,
        }
    }

    pub(crate) fn key(&self) -> &SegmentKey {
        &self.key
    }

    pub(crate) fn identity(&self) -> Identity {
        self.identity
    }

    /// Whether this process brought the OS object into existence.
    pub(crate) fn created(&self) -> bool {
        self.created
    }

    pub(crate) fn len(&self) -> usize {
        self.region.size()
    }
}

/// Fixed-length byte view straight onto a segment's mapping.
///
/// Nothing is copied: writes land in the shared object and show up in every
/// process mapping it, reads return whatever is there at the time of the
/// call. No synchronization with other writers is performed.
///
/// Clones share the mapping, which stays in place until the last view and
/// the manager's registry entry are gone. Unlinking a segment therefore never
/// invalidates a live view, it only detaches the name.
#[derive(Clone)]
pub struct SegmentView {
    segment: Arc<Segment>,
}

impl SegmentView {
    pub(crate) fn new(segment: Arc<Segment>) -> Self {
        SegmentView { segment }
    }

    pub fn key(&self) -> &str {
        self.segment.key.as_str()
    }

    /// The OS-level object name, e.g. `/prefix.key`.
    pub fn name(&self) -> &str {
        self.segment.key.name_str()
    }

    pub fn len(&self) -> usize {
        self.segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.segment.region.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.segment.region.as_mut_ptr()
    }

    /// True when both views are backed by the same mapping.
    pub fn same_mapping(&self, other: &SegmentView) -> bool {
        Arc::ptr_eq(&self.segment, &other.segment)
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(Error::OutOfBounds { offset, len, size }),
        }
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check(offset, buf.len())?;
        unsafe {
            ptr::copy_nonoverlapping(self.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.as_mut_ptr().add(offset), data.len());
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len() {
            Some(unsafe { ptr::read_volatile(self.as_ptr().add(index)) })
        } else {
            None
        }
    }

    pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
        self.check(index, 1)?;
        unsafe { ptr::write_volatile(self.as_mut_ptr().add(index), value) };
        Ok(())
    }

    pub fn fill(&mut self, value: u8) {
        let len = self.len();
        unsafe { ptr::write_bytes(self.as_mut_ptr(), value, len) };
    }

    /// Snapshot of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![0; self.len()];
        // Same length as the mapping.
        let _ = self.read_at(0, &mut buf);
        buf
    }

    /// Borrows the mapping as a slice.
    ///
    /// # Safety
    ///
    /// Other views, threads or processes may write the same bytes while the
    /// slice is alive; the caller must rule that out.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.as_ptr(), self.len())
    }

    /// Borrows the mapping as a mutable slice.
    ///
    /// # Safety
    ///
    /// The caller must guarantee exclusive access to the bytes for the
    /// lifetime of the slice, including against clones of this view.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        std::slice::from_raw_parts_mut(self.as_mut_ptr(), len)
    }

    /// Writes dirty pages back with `msync`.
    pub fn flush(&self) -> Result<()> {
        self.segment
            .region
            .flush(0, 0)
            .map_err(|ec| ec.into_error("msync", self.name()))
    }

    /// Like [`flush`](SegmentView::flush), limited to the pages holding
    /// `len` bytes at `offset`.
    pub fn flush_range(&self, offset: usize, len: usize) -> Result<()> {
        self.check(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        self.segment
            .region
            .flush(offset, len)
            .map_err(|ec| ec.into_error("msync", self.name()))
    }
}

impl fmt::Debug for SegmentView {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SegmentView")
            .field("key", &self.key())
            .field("name", &self.name())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
fn test_view(tag: &str, size: usize) -> (SegmentView, SegmentKey) {
    use crate::ffi::Permissions;
    use crate::shared_memory::SharedMemoryObject;

    let key = SegmentKey::new("", &format!("shmu{}{}", std::process::id(), tag)).unwrap();
    let _ = SharedMemoryObject::remove(key.name());
    let obj = SharedMemoryObject::create(key.name(), Permissions::default()).unwrap();
    obj.truncate(size).unwrap();
    let status = obj.status().unwrap();
    let region = MappedRegion::new(obj.handle(), size).unwrap();
    let segment = Segment::new(key.clone(), region, status.identity, true);
    (SegmentView::new(Arc::new(segment)), key)
}

#[test]
fn test_view_access() {
    let (mut view, key) = test_view("va", 64);
    assert_eq!(view.len(), 64);
    assert!(!view.is_empty());
    assert_eq!(view.to_vec(), vec![0; 64]);

    view.write_at(60, &[1, 2, 3, 4]).unwrap();
    let mut buf = [0; 4];
    view.read_at(60, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);

    view.set(0, 0xff).unwrap();
    assert_eq!(view.get(0), Some(0xff));
    assert_eq!(view.get(64), None);

    view.fill(7);
    assert!(unsafe { view.as_slice() }.iter().all(|&b| b == 7));
    view.flush().unwrap();

    crate::shared_memory::SharedMemoryObject::remove(key.name()).unwrap();
}

#[test]
fn test_view_bounds() {
    let (mut view, key) = test_view("vb", 16);
    assert!(matches!(
        view.write_at(10, &[0; 7]),
        Err(Error::OutOfBounds {
            offset: 10,
            len: 7,
            size: 16
        })
    ));
    assert!(view.read_at(usize::MAX, &mut [0; 2]).is_err());
    assert!(view.set(16, 1).is_err());
    assert!(view.write_at(16, &[]).is_ok());

    crate::shared_memory::SharedMemoryObject::remove(key.name()).unwrap();
}

#[test]
fn test_flush_range() {
    let size = crate::mapped_region::page_size() + 64;
    let (mut view, key) = test_view("vf", size);

    // Straddles the first page boundary from an unaligned offset.
    let offset = size - 100;
    view.write_at(offset, &[5; 90]).unwrap();
    view.flush_range(offset, 90).unwrap();
    view.flush_range(1, 1).unwrap();
    view.flush_range(size, 0).unwrap();
    assert!(matches!(
        view.flush_range(offset, 101),
        Err(Error::OutOfBounds { .. })
    ));

    crate::shared_memory::SharedMemoryObject::remove(key.name()).unwrap();
}

#[test]
fn test_clones_share_mapping() {
    let (view, key) = test_view("vc", 8);
    let mut other = view.clone();
    assert!(view.same_mapping(&other));
    other.set(3, 9).unwrap();
    assert_eq!(view.get(3), Some(9));
    assert!(format!("{:?}", view).contains("len: 8"));

    crate::shared_memory::SharedMemoryObject::remove(key.name()).unwrap();
}
