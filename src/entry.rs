//! Archive entry descriptors and the per-archive entry set.
//!
//! An [`ArchiveEntry`] describes one named item inside an open archive; it is
//! distinct from a [`Node`], which represents a real filesystem entry. The
//! [`EntrySet`] maps entry names to descriptors and implements the
//! directory-suffix fallback lookup: zip archives store directories with a
//! trailing `/`, so a lookup for `"docs"` that misses retries as `"docs/"`
//! before giving up.
//!
//! [`Node`]: crate::Node

use std::collections::BTreeMap;
use std::time::SystemTime;

/// One named item inside an open archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// The stored entry name; directories carry a trailing separator.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Size as stored in the archive.
    pub compressed_size: u64,
    /// Recorded modification time, when the archive carries one.
    pub modified: Option<SystemTime>,
    /// `true` for directory entries.
    pub is_directory: bool,
}

/// Returns `true` if `name` looks like a stored directory name.
pub(crate) fn is_directory_path(name: &str) -> bool {
    name.ends_with('/')
}

/// The entry collection of one open archive, keyed by stored name.
///
/// Iteration order is the name order; insertion order is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct EntrySet {
    map: BTreeMap<String, ArchiveEntry>,
}

impl EntrySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry under its stored name, replacing any previous one.
    pub fn insert(&mut self, entry: ArchiveEntry) {
        self.map.insert(entry.name.clone(), entry);
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up an entry by its exact stored name.
    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.map.get(name)
    }

    /// Looks up an entry by name with the directory-suffix fallback.
    ///
    /// If the exact name misses and does not already look like a directory
    /// path, the lookup retries with `name + "/"`.
    pub fn lookup(&self, name: &str) -> Option<&ArchiveEntry> {
        if let Some(entry) = self.map.get(name) {
            return Some(entry);
        }
        if !is_directory_path(name) {
            return self.map.get(&format!("{}/", name));
        }
        None
    }

    /// Iterates over entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.map.values()
    }

    /// Copies all entries into a vector, in name order.
    pub fn to_vec(&self) -> Vec<ArchiveEntry> {
        self.map.values().cloned().collect()
    }
}
