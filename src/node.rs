//! Resolved filesystem nodes with a virtual permission mask.
//!
//! A [`Node`] is the result of resolving a [`NodePath`] against the real
//! filesystem: it knows whether the target is a file or a directory (after
//! following symlinks) and carries a *virtual* read/write mask that is
//! independent of OS permissions. The mask starts empty; callers grant what
//! the operation at hand needs.
//!
//! Nodes are not cached: a node can go stale relative to the filesystem, and
//! callers re-resolve before operations that assume freshness.
//!
//! # Partial-failure enumeration
//!
//! [`Node::children`] silently skips entries that fail to resolve (removed
//! mid-enumeration, unsupported entry types). Recursive [`Node::remove`]
//! applies the same policy to individual children. This mirrors the contract
//! of the platform layer this crate models and is intentional.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipnode::{Node, NodePath, NodeType, VirtualPerms};
//!
//! # fn main() -> zipnode::Result<()> {
//! let path = NodePath::new("/tmp")?;
//! let mut dir = Node::resolve(&path)?;
//! assert_eq!(dir.node_type(), NodeType::Directory);
//!
//! dir.set_permissions(VirtualPerms::READ);
//! for child in dir.children()? {
//!     println!("{}", child.path().name());
//! }
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io;
use std::ops::BitOr;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use log::{debug, warn};

use crate::mode::FileMode;
use crate::path::{NodePath, SEPARATOR};
use crate::{Error, Result};

/// The kind of filesystem entry a node represents.
///
/// Symlinks are resolved during [`Node::resolve`]; a link to a directory is a
/// `Directory`. Sockets, devices, and FIFOs are rejected at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// A regular file (or a symlink to one).
    File,
    /// A directory (or a symlink to one).
    Directory,
}

/// In-memory read/write mask attached to a [`Node`].
///
/// Independent of OS file permissions: it governs which node operations this
/// layer allows, not what the kernel would permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VirtualPerms(u8);

impl VirtualPerms {
    /// No access.
    pub const NONE: VirtualPerms = VirtualPerms(0);
    /// Read access (enumeration, stat queries requiring it).
    pub const READ: VirtualPerms = VirtualPerms(1);
    /// Write access (child creation).
    pub const WRITE: VirtualPerms = VirtualPerms(2);
    /// Read and write access.
    pub const READ_WRITE: VirtualPerms = VirtualPerms(3);

    /// Returns `true` if every bit of `other` is granted.
    #[inline]
    pub fn contains(&self, other: VirtualPerms) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VirtualPerms {
    type Output = VirtualPerms;

    fn bitor(self, rhs: VirtualPerms) -> VirtualPerms {
        VirtualPerms(self.0 | rhs.0)
    }
}

/// Counter making write-probe filenames unique within the process.
static PROBE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A resolved filesystem entry.
///
/// Constructed only through [`Node::resolve`]; a node is never built for a
/// path that failed existence resolution.
#[derive(Debug, Clone)]
pub struct Node {
    path: NodePath,
    node_type: NodeType,
    perms: VirtualPerms,
}

impl Node {
    /// Resolves `path` against the filesystem.
    ///
    /// The entry is inspected without following symlinks first; if it is a
    /// link, the target is inspected to determine the node type, so a link to
    /// a directory resolves as [`NodeType::Directory`]. A dangling link
    /// surfaces as whatever error following it produces.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist.
    /// - [`Error::AccessDenied`] if an ancestor denies traversal.
    /// - [`Error::Io`] for unsupported entry types (sockets, devices, FIFOs)
    ///   and any other OS failure.
    pub fn resolve(path: &NodePath) -> Result<Node> {
        let meta = fs::symlink_metadata(path.full_path())
            .map_err(|e| Error::from_fs(e, path.full_path()))?;
        let file_type = meta.file_type();

        let node_type = if file_type.is_symlink() {
            let target = fs::metadata(path.full_path())
                .map_err(|e| Error::from_fs(e, path.full_path()))?;
            if target.is_dir() {
                NodeType::Directory
            } else if target.is_file() {
                NodeType::File
            } else {
                return Err(unsupported_type(path));
            }
        } else if file_type.is_dir() {
            NodeType::Directory
        } else if file_type.is_file() {
            NodeType::File
        } else {
            return Err(unsupported_type(path));
        };

        debug!("resolved {} as {:?}", path.full_path(), node_type);
        Ok(Node {
            path: path.clone(),
            node_type,
            perms: VirtualPerms::NONE,
        })
    }

    /// Returns the node's path.
    #[inline]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Returns the node's type.
    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Returns the virtual permission mask.
    #[inline]
    pub fn permissions(&self) -> VirtualPerms {
        self.perms
    }

    /// Replaces the virtual permission mask.
    #[inline]
    pub fn set_permissions(&mut self, perms: VirtualPerms) {
        self.perms = perms;
    }

    /// Probes whether `mode` access to `path` would succeed on the OS level.
    ///
    /// For a directory, the check verifies the directory can be opened (a
    /// failure there is [`Error::InvalidState`]); for any mode beyond
    /// read-only it additionally creates and immediately deletes a
    /// uniquely-named temporary file inside it. A failed probe reports
    /// `Ok(false)` rather than propagating the probe's own error.
    ///
    /// For a file, the check opens it read-only (mode `r`) or for append
    /// (`w` / `rw` / `a`) and reports whether the open succeeded.
    pub fn check_permission(path: &NodePath, mode: FileMode, node_type: NodeType) -> Result<bool> {
        match node_type {
            NodeType::Directory => {
                fs::read_dir(path.full_path()).map_err(|_| {
                    Error::InvalidState(format!(
                        "node has been deleted from platform: {}",
                        path.full_path()
                    ))
                })?;

                if mode == FileMode::Read {
                    return Ok(true);
                }

                let probe = path.append(format!(
                    ".zipnode-probe-{}-{}",
                    process::id(),
                    PROBE_SEQ.fetch_add(1, Ordering::Relaxed)
                ));
                if fs::File::create(probe.full_path()).is_err() {
                    return Ok(false);
                }
                Ok(fs::remove_file(probe.full_path()).is_ok())
            }
            NodeType::File => {
                let mut options = fs::OpenOptions::new();
                match mode {
                    FileMode::Read => options.read(true),
                    FileMode::Write | FileMode::ReadWrite | FileMode::Add => options.append(true),
                };
                Ok(options.open(path.full_path()).is_ok())
            }
        }
    }

    /// Resolves a child of this directory by relative path.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if this node is not a directory; otherwise whatever
    /// [`Node::resolve`] produces for the joined path.
    pub fn child(&self, relative: &NodePath) -> Result<Node> {
        if self.node_type != NodeType::Directory {
            return Err(Error::Io(io::Error::other("not a directory")));
        }
        Node::resolve(&self.path.append(relative.full_path()))
    }

    /// Enumerates this directory's children as resolved nodes.
    ///
    /// Requires [`NodeType::Directory`] and read permission. Children that
    /// fail to resolve are skipped, not reported; resolved children inherit
    /// this node's virtual permissions.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if this is not a directory, [`Error::InvalidValues`] if
    /// read permission is missing, [`Error::Io`] if the directory cannot be
    /// read.
    pub fn children(&self) -> Result<Vec<Node>> {
        let read_dir = self.open_for_listing()?;

        let mut nodes = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable entry in {}: {}", self.path, e);
                    continue;
                }
            };
            let child_path = self.path.append(dir_entry.file_name().to_string_lossy());
            match Node::resolve(&child_path) {
                Ok(mut node) => {
                    node.set_permissions(self.perms);
                    nodes.push(node);
                }
                Err(e) => {
                    // Removed mid-enumeration or an unsupported entry type;
                    // enumeration continues without it.
                    debug!("skipping unresolvable child {}: {}", child_path, e);
                }
            }
        }
        Ok(nodes)
    }

    /// Enumerates this directory's child names without resolving them.
    ///
    /// Same gating as [`Node::children`].
    pub fn child_names(&self) -> Result<Vec<String>> {
        let read_dir = self.open_for_listing()?;

        let mut names = Vec::new();
        for dir_entry in read_dir {
            match dir_entry {
                Ok(e) => names.push(e.file_name().to_string_lossy().into_owned()),
                Err(e) => warn!("skipping unreadable entry in {}: {}", self.path, e),
            }
        }
        Ok(names)
    }

    /// Creates a child file or directory below this node.
    ///
    /// Requires [`NodeType::Directory`] and write permission. The created
    /// child inherits this node's virtual permissions.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if this is not a directory or a node already exists at
    /// the target path; [`Error::InvalidValues`] without write permission.
    pub fn create_child(&self, relative: &NodePath, node_type: NodeType) -> Result<Node> {
        if self.node_type != NodeType::Directory {
            return Err(Error::Io(io::Error::other("parent node is not a directory")));
        }
        if !self.perms.contains(VirtualPerms::WRITE) {
            return Err(Error::InvalidValues(format!(
                "not enough permissions to create below {}",
                self.path
            )));
        }

        let child_path = self.path.append(relative.full_path());
        if fs::symlink_metadata(child_path.full_path()).is_ok() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("node already exists: {}", child_path),
            )));
        }

        match node_type {
            NodeType::File => {
                fs::File::create(child_path.full_path())?;
            }
            NodeType::Directory => {
                fs::create_dir(child_path.full_path())?;
            }
        }

        debug!("created {:?} child {}", node_type, child_path);
        Ok(Node {
            path: child_path,
            node_type,
            perms: self.perms,
        })
    }

    /// Removes the entry this node points at.
    ///
    /// Files are unlinked. For directories, `recursive` removes every child
    /// depth-first (swallowing individual child failures, matching the
    /// enumeration policy) before removing the directory itself; without
    /// `recursive`, a non-empty directory fails with [`Error::Io`] and the
    /// filesystem is left unchanged.
    pub fn remove(&self, recursive: bool) -> Result<()> {
        match self.node_type {
            NodeType::File => fs::remove_file(self.path.full_path()).map_err(Error::Io),
            NodeType::Directory => {
                if recursive {
                    remove_dir_contents(&self.path);
                }
                fs::remove_dir(self.path.full_path()).map_err(Error::Io)
            }
        }
    }

    /// Returns the file size in bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] for directories (not supported) and for anything that is
    /// not a regular file after following symlinks.
    pub fn size(&self) -> Result<u64> {
        if self.node_type == NodeType::Directory {
            return Err(Error::Io(io::Error::other(
                "getting size is not supported for directories",
            )));
        }
        let meta = self.stat()?;
        if !meta.is_file() {
            return Err(Error::Io(io::Error::other("node is not a regular file")));
        }
        Ok(meta.len())
    }

    /// Returns the creation (status-change) timestamp.
    pub fn created(&self) -> Result<SystemTime> {
        let meta = self.stat()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let secs = meta.ctime();
            let nanos = meta.ctime_nsec() as u32;
            let base = SystemTime::UNIX_EPOCH;
            if secs >= 0 {
                Ok(base + std::time::Duration::new(secs as u64, nanos))
            } else {
                Ok(base - std::time::Duration::from_secs(secs.unsigned_abs()))
            }
        }
        #[cfg(not(unix))]
        {
            meta.created().map_err(Error::Io)
        }
    }

    /// Returns the modification timestamp.
    pub fn modified(&self) -> Result<SystemTime> {
        let meta = self.stat()?;
        meta.modified().map_err(Error::Io)
    }

    /// Returns the OS permission bits (the `rwx` triplets) of the target.
    pub fn mode(&self) -> Result<u32> {
        let meta = self.stat()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Ok(meta.permissions().mode() & 0o777)
        }
        #[cfg(not(unix))]
        {
            Ok(if meta.permissions().readonly() { 0o444 } else { 0o644 })
        }
    }

    /// Resolves this node's parent, inheriting the virtual permissions.
    ///
    /// Returns `Ok(None)` when the path has no parent.
    pub fn parent(&self) -> Result<Option<Node>> {
        match self.path.parent() {
            None => Ok(None),
            Some(parent_path) => {
                let mut parent = Node::resolve(&parent_path)?;
                parent.set_permissions(self.perms);
                Ok(Some(parent))
            }
        }
    }

    /// Returns `true` if `candidate` lies below this node's path.
    ///
    /// Purely syntactic byte-prefix comparison after ensuring the parent path
    /// ends with exactly one separator; `candidate` is not resolved, so this
    /// does not guarantee the path still exists.
    pub fn is_sub_path(&self, candidate: &NodePath) -> bool {
        let mut prefix = self.path.full_path().to_string();
        if !prefix.ends_with(SEPARATOR) {
            prefix.push(SEPARATOR);
        }
        candidate.full_path().starts_with(&prefix)
    }

    fn stat(&self) -> Result<fs::Metadata> {
        fs::metadata(self.path.full_path()).map_err(|e| Error::from_fs(e, self.path.full_path()))
    }

    fn open_for_listing(&self) -> Result<fs::ReadDir> {
        if self.node_type != NodeType::Directory {
            return Err(Error::Io(io::Error::other("node is not a directory")));
        }
        if !self.perms.contains(VirtualPerms::READ) {
            return Err(Error::InvalidValues(format!(
                "no read permission on {}",
                self.path
            )));
        }
        fs::read_dir(self.path.full_path())
            .map_err(|_| Error::Io(io::Error::other("node has been deleted from platform")))
    }
}

/// Returns `true` if something exists at `path`, without following a final
/// symlink.
pub fn exists(path: &NodePath) -> bool {
    fs::symlink_metadata(path.full_path()).is_ok()
}

fn unsupported_type(path: &NodePath) -> Error {
    Error::Io(io::Error::other(format!(
        "platform node is of unsupported type: {}",
        path.full_path()
    )))
}

/// Removes everything below `path` depth-first, swallowing child failures.
fn remove_dir_contents(path: &NodePath) {
    let entries = match fs::read_dir(path.full_path()) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("cannot list {} for recursive removal: {}", path, e);
            return;
        }
    };

    for dir_entry in entries.flatten() {
        let child = path.append(dir_entry.file_name().to_string_lossy());
        let meta = match fs::symlink_metadata(child.full_path()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if meta.is_dir() {
            remove_dir_contents(&child);
            if let Err(e) = fs::remove_dir(child.full_path()) {
                warn!("failed to remove directory {}: {}", child, e);
            }
        } else if let Err(e) = fs::remove_file(child.full_path()) {
            warn!("failed to remove file {}: {}", child, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perms_contains() {
        assert!(VirtualPerms::READ_WRITE.contains(VirtualPerms::READ));
        assert!(VirtualPerms::READ_WRITE.contains(VirtualPerms::WRITE));
        assert!(!VirtualPerms::READ.contains(VirtualPerms::WRITE));
        assert!(VirtualPerms::NONE.contains(VirtualPerms::NONE));
        assert_eq!(VirtualPerms::READ | VirtualPerms::WRITE, VirtualPerms::READ_WRITE);
    }

    #[test]
    fn test_is_sub_path_is_syntactic() {
        let dir = Node {
            path: NodePath::new("/a/b").unwrap(),
            node_type: NodeType::Directory,
            perms: VirtualPerms::NONE,
        };
        assert!(dir.is_sub_path(&NodePath::new("/a/b/c").unwrap()));
        assert!(dir.is_sub_path(&NodePath::new("/a/b/c/d").unwrap()));
        // Same path is not a sub-path, and sibling prefixes must not match.
        assert!(!dir.is_sub_path(&NodePath::new("/a/b").unwrap()));
        assert!(!dir.is_sub_path(&NodePath::new("/a/bc").unwrap()));
    }
}
