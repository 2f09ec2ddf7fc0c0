//! Filesystem path value type with normalized (parent, name) structure.
//!
//! [`NodePath`] is an immutable path: constructed once from a raw string,
//! normalized, and split into a parent portion and a last segment. Derived
//! paths are produced with [`NodePath::append`], never by mutation.
//!
//! # Normalization
//!
//! - Exactly one trailing separator is trimmed (`"a/b/"` → `"a/b"`).
//! - The root path is exactly one separator (`"/"`), never trimmed to empty.
//! - Normalization is idempotent: re-parsing a normalized full path yields an
//!   equal value.
//!
//! # Example
//!
//! ```rust
//! use zipnode::NodePath;
//!
//! let path = NodePath::new("/opt/data/archive.zip").unwrap();
//! assert_eq!(path.full_path(), "/opt/data/archive.zip");
//! assert_eq!(path.parent_path(), "/opt/data");
//! assert_eq!(path.name(), "archive.zip");
//!
//! let nested = path.append("inner");
//! assert_eq!(nested.full_path(), "/opt/data/archive.zip/inner");
//! ```

use std::fmt;

use crate::{Error, Result};

/// The path separator used throughout this crate.
pub const SEPARATOR: char = '/';

/// An immutable, normalized filesystem path.
///
/// Equality, ordering, and hashing are defined purely on the full path
/// string. Cloning is cheap (one string buffer per component).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath {
    full: String,
    parent: String,
    name: String,
}

impl NodePath {
    /// Creates a path from a raw string, normalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if `raw` is empty. There is no silent
    /// empty-path sentinel; callers must handle the error.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(Error::InvalidPath("empty path".to_string()));
        }

        // Root keeps its single separator; everywhere else one trailing
        // separator is trimmed.
        let mut trimmed = raw;
        if trimmed.len() > 1 && trimmed.ends_with(SEPARATOR) {
            trimmed = &trimmed[..trimmed.len() - SEPARATOR.len_utf8()];
        }

        match trimmed.rfind(SEPARATOR) {
            None => Ok(Self {
                full: trimmed.to_string(),
                parent: String::new(),
                name: trimmed.to_string(),
            }),
            Some(0) => {
                let name = &trimmed[1..];
                if name.is_empty() {
                    // The root itself.
                    Ok(Self {
                        full: SEPARATOR.to_string(),
                        parent: String::new(),
                        name: SEPARATOR.to_string(),
                    })
                } else {
                    Ok(Self {
                        full: trimmed.to_string(),
                        parent: SEPARATOR.to_string(),
                        name: name.to_string(),
                    })
                }
            }
            Some(pos) => Ok(Self {
                full: trimmed.to_string(),
                parent: trimmed[..pos].to_string(),
                name: trimmed[pos + 1..].to_string(),
            }),
        }
    }

    /// Returns the complete normalized path.
    #[inline]
    pub fn full_path(&self) -> &str {
        &self.full
    }

    /// Returns the parent portion of the path, empty if there is none.
    #[inline]
    pub fn parent_path(&self) -> &str {
        &self.parent
    }

    /// Returns the last segment of the path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent as a path of its own, or `None` at the top.
    pub fn parent(&self) -> Option<NodePath> {
        if self.parent.is_empty() || self.parent == self.full {
            return None;
        }
        // The parent string came out of a successful parse, so it is
        // non-empty and re-parses cleanly.
        NodePath::new(&self.parent).ok()
    }

    /// Returns a new path with `other` joined below this one.
    ///
    /// The receiver is not modified. The joined string is re-normalized, so
    /// appending an empty string or a string with a trailing separator is
    /// harmless.
    pub fn append(&self, other: impl AsRef<str>) -> NodePath {
        let mut joined = self.full.clone();
        if !joined.ends_with(SEPARATOR) {
            joined.push(SEPARATOR);
        }
        joined.push_str(other.as_ref());
        // `joined` starts from a non-empty full path, so parsing cannot fail.
        NodePath::new(&joined).expect("append of a valid path is always valid")
    }

    /// Returns `true` if the path starts with the separator.
    #[inline]
    pub fn is_absolute(&self) -> bool {
        self.full.starts_with(SEPARATOR)
    }

    /// Returns `true` if this path is the root (`/`).
    #[inline]
    pub fn is_root(&self) -> bool {
        self.full.len() == 1 && self.is_absolute()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl PartialEq<str> for NodePath {
    fn eq(&self, other: &str) -> bool {
        self.full == other
    }
}

impl PartialEq<&str> for NodePath {
    fn eq(&self, other: &&str) -> bool {
        self.full == *other
    }
}

impl TryFrom<&str> for NodePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_absolute() {
        let p = NodePath::new("/opt/data/file.txt").unwrap();
        assert_eq!(p.full_path(), "/opt/data/file.txt");
        assert_eq!(p.parent_path(), "/opt/data");
        assert_eq!(p.name(), "file.txt");
        assert!(p.is_absolute());
    }

    #[test]
    fn test_relative_single_segment() {
        let p = NodePath::new("file.txt").unwrap();
        assert_eq!(p.full_path(), "file.txt");
        assert_eq!(p.parent_path(), "");
        assert_eq!(p.name(), "file.txt");
        assert!(!p.is_absolute());
    }

    #[test]
    fn test_trailing_separator_trimmed() {
        let p = NodePath::new("/opt/data/").unwrap();
        assert_eq!(p.full_path(), "/opt/data");
        assert_eq!(p.name(), "data");
    }

    #[test]
    fn test_root() {
        let p = NodePath::new("/").unwrap();
        assert_eq!(p.full_path(), "/");
        assert_eq!(p.parent_path(), "");
        assert!(p.is_root());
        assert!(p.parent().is_none());
    }

    #[test]
    fn test_directly_under_root() {
        let p = NodePath::new("/tmp").unwrap();
        assert_eq!(p.full_path(), "/tmp");
        assert_eq!(p.parent_path(), "/");
        assert_eq!(p.name(), "tmp");
    }

    #[test]
    fn test_empty_is_invalid() {
        let err = NodePath::new("").unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn test_idempotent_normalization() {
        for raw in ["/a/b/c/", "/a/b/c", "a", "/", "a/b/"] {
            let once = NodePath::new(raw).unwrap();
            let twice = NodePath::new(once.full_path()).unwrap();
            assert_eq!(once, twice, "re-parsing {:?} changed the path", raw);
        }
    }

    #[test]
    fn test_invariant_parent_plus_name() {
        let p = NodePath::new("/a/b/c").unwrap();
        assert_eq!(
            p.full_path(),
            format!("{}{}{}", p.parent_path(), SEPARATOR, p.name())
        );

        let q = NodePath::new("plain").unwrap();
        assert_eq!(q.full_path(), q.name());
    }

    #[test]
    fn test_append_does_not_mutate() {
        let base = NodePath::new("/a/b").unwrap();
        let child = base.append("c");
        assert_eq!(base.full_path(), "/a/b");
        assert_eq!(child.full_path(), "/a/b/c");
        assert_eq!(child.parent_path(), "/a/b");
    }

    #[test]
    fn test_append_matches_string_concat() {
        let base = NodePath::new("/x/y").unwrap();
        let joined = base.append("z/w");
        let direct = NodePath::new("/x/y/z/w").unwrap();
        assert_eq!(joined, direct);
    }

    #[test]
    fn test_append_empty_is_identity() {
        let base = NodePath::new("/a/b").unwrap();
        assert_eq!(base.append(""), base);
    }

    #[test]
    fn test_append_onto_root() {
        let root = NodePath::new("/").unwrap();
        let p = root.append("tmp");
        assert_eq!(p.full_path(), "/tmp");
    }

    #[test]
    fn test_parent_chain() {
        let p = NodePath::new("/a/b/c").unwrap();
        let b = p.parent().unwrap();
        assert_eq!(b.full_path(), "/a/b");
        let a = b.parent().unwrap();
        assert_eq!(a.full_path(), "/a");
        let root = a.parent().unwrap();
        assert_eq!(root.full_path(), "/");
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_equality_on_full_path() {
        let a = NodePath::new("/a/b").unwrap();
        let b = NodePath::new("/a/b/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "/a/b");
    }

    #[test]
    fn test_display() {
        let p = NodePath::new("/a/b").unwrap();
        assert_eq!(format!("{}", p), "/a/b");
    }

    #[test]
    fn test_try_from() {
        let p: NodePath = "/a/b".try_into().unwrap();
        assert_eq!(p.full_path(), "/a/b");
        let q: NodePath = String::from("/a/b").try_into().unwrap();
        assert_eq!(p, q);
    }
}
