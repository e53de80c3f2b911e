//! Resolution of caller keys into POSIX shared memory object names.
//!
//! A key is printable ASCII without `/` or `\`. The resolved name is
//! `/` + prefix + key and must fit in [`MAX_NAME_LEN`] bytes, the macOS
//! `PSHMNAMLEN` limit; Linux accepts anything up to `NAME_MAX` so the
//! stricter bound keeps keys portable between the two.

use crate::err::{Error, Result};

use std::ffi::{CStr, CString};
use std::fmt;

/// Longest object name, leading `/` included.
pub const MAX_NAME_LEN: usize = 31;

/// A validated key together with the OS name it resolves to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    key: String,
    name: CString,
}

fn check_chars(s: &str) -> std::result::Result<(), &'static str> {
    for c in s.chars() {
        match c {
            '/' | '\\' => return Err("must not contain path separators"),
            ' '..='~' => {}
            _ => return Err("must be printable ASCII"),
        }
    }
    Ok(())
}

/// Checks a namespace prefix on its own.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    check_chars(prefix).map_err(|reason| Error::InvalidKey {
        key: prefix.to_string(),
        reason,
    })?;
    if prefix.len() + 1 >= MAX_NAME_LEN {
        return Err(Error::InvalidKey {
            key: prefix.to_string(),
            reason: "prefix leaves no room for a key",
        });
    }
    Ok(())
}

impl SegmentKey {
    pub fn new(prefix: &str, key: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidKey {
            key: key.to_string(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("must not be empty"));
        }
        check_chars(key).map_err(invalid)?;
        validate_prefix(prefix)?;

        let name = format!("/{}{}", prefix, key);
        if name.len() > MAX_NAME_LEN {
            return Err(invalid("resolved name exceeds 31 bytes"));
        }
        // Printable ASCII never holds a NUL.
        let name = CString::new(name).map_err(|_| invalid("must not contain NUL"))?;

        Ok(SegmentKey {
            key: key.to_string(),
            name,
        })
    }

    /// The key as the caller spelled it.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    pub fn name_str(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }
}

impl fmt::Debug for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({})", self.key, self.name_str())
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
fn reason(res: Result<SegmentKey>) -> &'static str {
    match res {
        Err(Error::InvalidKey { reason, .. }) => reason,
        other => panic!("expected InvalidKey, got {:?}", other),
    }
}

#[test]
fn test_resolve() {
    let key = SegmentKey::new("", "seg-a").unwrap();
    assert_eq!(key.as_str(), "seg-a");
    assert_eq!(key.name_str(), "/seg-a");

    let key = SegmentKey::new("app.", "skyline_16_1743670121111").unwrap();
    assert_eq!(key.name_str(), "/app.skyline_16_1743670121111");
    assert_eq!(key.to_string(), "skyline_16_1743670121111");
}

#[test]
fn test_invalid_keys() {
    assert_eq!(reason(SegmentKey::new("", "")), "must not be empty");
    assert_eq!(
        reason(SegmentKey::new("", "a/b")),
        "must not contain path separators"
    );
    assert_eq!(
        reason(SegmentKey::new("", "a\\b")),
        "must not contain path separators"
    );
    assert_eq!(reason(SegmentKey::new("", "tab\there")), "must be printable ASCII");
    assert_eq!(reason(SegmentKey::new("", "ключ")), "must be printable ASCII");
}

#[test]
fn test_length_limit() {
    let longest = "k".repeat(MAX_NAME_LEN - 1);
    assert!(SegmentKey::new("", &longest).is_ok());
    assert_eq!(
        reason(SegmentKey::new("", &format!("{}k", longest))),
        "resolved name exceeds 31 bytes"
    );
    assert!(SegmentKey::new("p", &longest).is_err());
}

#[test]
fn test_prefix() {
    assert!(validate_prefix("").is_ok());
    assert!(validate_prefix("shmseg.").is_ok());
    assert!(validate_prefix("a/b").is_err());
    assert!(validate_prefix(&"p".repeat(MAX_NAME_LEN - 1)).is_err());
}
