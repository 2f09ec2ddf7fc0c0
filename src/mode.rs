//! Access modes shared by the node permission probe and the archive layer.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Access mode for opening an archive or probing a node.
///
/// Parsed from the caller-supplied mode string; anything outside
/// `r` / `w` / `rw` / `a` is an [`Error::InvalidValues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Read-only access (`"r"`).
    Read,
    /// Write access, creating or replacing content (`"w"`).
    Write,
    /// Combined read and write access (`"rw"`).
    ReadWrite,
    /// Append-only access (`"a"`).
    Add,
}

impl FileMode {
    /// Returns the wire representation of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Read => "r",
            FileMode::Write => "w",
            FileMode::ReadWrite => "rw",
            FileMode::Add => "a",
        }
    }

    /// Returns `true` if this mode permits any modification.
    pub fn writes(&self) -> bool {
        !matches!(self, FileMode::Read)
    }
}

impl FromStr for FileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(FileMode::Read),
            "w" => Ok(FileMode::Write),
            "rw" => Ok(FileMode::ReadWrite),
            "a" => Ok(FileMode::Add),
            other => Err(Error::InvalidValues(format!("invalid mode '{}'", other))),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_modes() {
        assert_eq!("r".parse::<FileMode>().unwrap(), FileMode::Read);
        assert_eq!("w".parse::<FileMode>().unwrap(), FileMode::Write);
        assert_eq!("rw".parse::<FileMode>().unwrap(), FileMode::ReadWrite);
        assert_eq!("a".parse::<FileMode>().unwrap(), FileMode::Add);
    }

    #[test]
    fn test_parse_invalid_mode() {
        for bad in ["", "x", "wr", "read", "R"] {
            let err = bad.parse::<FileMode>().unwrap_err();
            assert!(matches!(err, Error::InvalidValues(_)), "mode {:?}", bad);
        }
    }

    #[test]
    fn test_roundtrip() {
        for mode in [FileMode::Read, FileMode::Write, FileMode::ReadWrite, FileMode::Add] {
            assert_eq!(mode.as_str().parse::<FileMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_writes() {
        assert!(!FileMode::Read.writes());
        assert!(FileMode::Write.writes());
        assert!(FileMode::ReadWrite.writes());
        assert!(FileMode::Add.writes());
    }
}
