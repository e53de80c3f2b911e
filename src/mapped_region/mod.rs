#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use self::unix::*;

pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn adjust_page_offset(offset: usize) -> usize {
    offset % page_size()
}

#[test]
fn test_adjust_page_offset() {
    let ps = page_size();
    assert_eq!(adjust_page_offset(0), 0);
    assert_eq!(adjust_page_offset(1), 1);
    assert_eq!(adjust_page_offset(ps - 1), ps - 1);
    assert_eq!(adjust_page_offset(ps), 0);
    assert_eq!(adjust_page_offset(ps + 1), 1);
}
