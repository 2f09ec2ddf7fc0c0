//! Process-wide archive registry and the open/close lifecycle.
//!
//! The [`ArchiveManager`] owns every open [`ArchiveFile`], keyed by an opaque
//! numeric [`Handle`]. Handles are produced by a monotonically increasing
//! counter and never reused while mapped; looking up an unmapped handle is a
//! typed [`Error::NotFound`]. All registry mutation goes through the manager.
//!
//! Operations follow the two-phase contract of the crate: synchronous
//! validation (handle lookup, allowed-operation gate, path/entry resolution)
//! fails with an immediate error, then the validated work is queued on the
//! archive's worker and its result arrives as an [`Event`] on the manager's
//! sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use zipnode::{ArchiveManager, Correlation, FileMode, OpenRequest};
//!
//! # fn main() -> zipnode::Result<()> {
//! let (tx, rx) = mpsc::channel();
//! let manager = ArchiveManager::new(tx);
//!
//! let handle = manager.open(
//!     OpenRequest::new("/tmp/a.zip", FileMode::Write).correlation(Correlation::new(1)),
//! )?;
//! manager.add(handle, "/tmp/data.txt", Correlation::new(2))?;
//! manager.close(handle)?;
//!
//! for event in rx.iter() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::archive::{ArchiveFile, ArchiveFunction, Task, TaskKind};
use crate::mode::FileMode;
use crate::node::{self, Node, NodeType, VirtualPerms};
use crate::operation::{Correlation, EventSink, OpRegistry, OperationId};
use crate::path::NodePath;
use crate::{Error, Result};

/// Opaque key identifying one open archive in the registry.
pub type Handle = u64;

/// Parameters of an [`ArchiveManager::open`] call.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    path: String,
    mode: FileMode,
    overwrite: bool,
    correlation: Correlation,
}

impl OpenRequest {
    /// Creates a request to open `path` in `mode`, with overwrite disabled.
    pub fn new(path: impl Into<String>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            mode,
            overwrite: false,
            correlation: Correlation::new(0),
        }
    }

    /// Sets the overwrite flag (only meaningful for writing modes).
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Attaches the correlation ids delivered back with the open result.
    pub fn correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }
}

/// Options of a single-entry extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    strip_name: bool,
    overwrite: bool,
}

impl ExtractOptions {
    /// Creates the default options: keep the leading directories, do not
    /// overwrite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strips the entry's leading directory path on extraction.
    pub fn strip_name(mut self, strip: bool) -> Self {
        self.strip_name = strip;
        self
    }

    /// Replaces existing files in the destination.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[derive(Default)]
struct Registry {
    archives: HashMap<Handle, Arc<ArchiveFile>>,
    next_handle: Handle,
}

struct ManagerInner {
    registry: Mutex<Registry>,
    operations: Arc<OpRegistry>,
    sink: Arc<dyn EventSink>,
}

/// The process-wide registry of open archives.
///
/// Cheap to clone; clones share one registry. Results and progress of queued
/// operations are delivered to the [`EventSink`] supplied at construction.
#[derive(Clone)]
pub struct ArchiveManager {
    inner: Arc<ManagerInner>,
}

impl ArchiveManager {
    /// Creates a manager posting events to `sink`.
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: Mutex::new(Registry::default()),
                operations: Arc::new(OpRegistry::new()),
                sink: Arc::new(sink),
            }),
        }
    }

    /// Opens an archive and registers it, returning its handle.
    ///
    /// The backing file is resolved or created synchronously:
    ///
    /// - An existing target opened `w`/`rw` with overwrite set is removed and
    ///   recreated empty; opened `w` without overwrite it is an
    ///   [`Error::InvalidModification`]; otherwise the existing file is used.
    /// - A missing target is created for the writing modes (the parent
    ///   directory must resolve; its error propagates); for mode `r` it is
    ///   [`Error::NotFound`].
    ///
    /// Reading the entry list happens asynchronously; the final
    /// [`Outcome::Opened`] or failure event follows on the sink. A failed or
    /// canceled open unregisters the handle.
    ///
    /// [`Outcome::Opened`]: crate::operation::Outcome::Opened
    pub fn open(&self, request: OpenRequest) -> Result<Handle> {
        let path = NodePath::new(&request.path)?;
        let mode = request.mode;

        let mut existing = None;
        if node::exists(&path) {
            let resolved = Node::resolve(&path)?;
            debug!(
                "open: {} mode {} overwrite {}",
                path, mode, request.overwrite
            );
            match mode {
                FileMode::Write | FileMode::ReadWrite if request.overwrite => {
                    // Proceed as if the target never existed.
                    resolved.remove(true)?;
                }
                FileMode::Write => {
                    return Err(Error::InvalidModification(
                        "zip archive already exists".to_string(),
                    ));
                }
                _ => existing = Some(resolved),
            }
        }

        let mut created_as_new_empty = false;
        let node = match existing {
            Some(node) => node,
            None => {
                if !mode.writes() {
                    return Err(Error::NotFound("archive file not found".to_string()));
                }
                let parent_path = path.parent().ok_or_else(|| {
                    Error::InvalidValues(format!("path {} has no parent directory", path))
                })?;
                let mut parent = Node::resolve(&parent_path)?;
                parent.set_permissions(VirtualPerms::READ_WRITE);
                let child = parent.create_child(&NodePath::new(path.name())?, NodeType::File)?;
                created_as_new_empty = true;
                child
            }
        };

        let archive = ArchiveFile::new(
            mode,
            request.overwrite,
            node,
            created_as_new_empty,
            Arc::clone(&self.inner.sink),
        );

        let handle = {
            let mut registry = self.inner.registry.lock().unwrap();
            registry.next_handle += 1;
            let handle = registry.next_handle;
            registry.archives.insert(handle, Arc::clone(&archive));
            handle
        };

        let guard = self
            .inner
            .operations
            .register(request.correlation.operation_id);
        archive.enqueue(Task {
            correlation: request.correlation,
            handle,
            guard,
            kind: TaskKind::Open {
                manager: self.clone(),
            },
        });
        Ok(handle)
    }

    /// Returns the archive mapped under `handle`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the handle is not mapped (never opened, or
    /// already closed).
    pub fn get(&self, handle: Handle) -> Result<Arc<ArchiveFile>> {
        self.inner
            .registry
            .lock()
            .unwrap()
            .archives
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no archive for handle {}", handle)))
    }

    /// Queues appending `source_file` (a file or a whole directory tree) to
    /// the archive.
    ///
    /// Entry names are computed relative to the source's parent directory.
    pub fn add(&self, handle: Handle, source_file: &str, correlation: Correlation) -> Result<()> {
        let archive = self.get(handle)?;
        if !archive.allows(ArchiveFunction::Add) {
            return Err(Error::InvalidValues(format!(
                "add not allowed in mode '{}'",
                archive.mode()
            )));
        }

        let source_path = NodePath::new(source_file)?;
        let mut source = Node::resolve(&source_path)?;
        source.set_permissions(VirtualPerms::READ_WRITE);
        let base_path = source.path().parent_path().to_string();

        let guard = self.inner.operations.register(correlation.operation_id);
        archive.enqueue(Task {
            correlation,
            handle,
            guard,
            kind: TaskKind::Add { source, base_path },
        });
        Ok(())
    }

    /// Queues extraction of every entry into `destination_dir`.
    pub fn extract_all(
        &self,
        handle: Handle,
        destination_dir: &str,
        overwrite: bool,
        correlation: Correlation,
    ) -> Result<()> {
        let archive = self.get(handle)?;
        if !archive.allows(ArchiveFunction::ExtractAll) {
            return Err(Error::InvalidValues(format!(
                "extractAll not allowed in mode '{}'",
                archive.mode()
            )));
        }
        let destination = self.resolve_destination(destination_dir)?;

        let guard = self.inner.operations.register(correlation.operation_id);
        archive.enqueue(Task {
            correlation,
            handle,
            guard,
            kind: TaskKind::ExtractAll {
                destination,
                overwrite,
            },
        });
        Ok(())
    }

    /// Queues listing the archive's entries.
    pub fn get_entries(&self, handle: Handle, correlation: Correlation) -> Result<()> {
        let archive = self.get(handle)?;
        if !archive.allows(ArchiveFunction::GetEntries) {
            return Err(Error::InvalidValues(format!(
                "getEntries not allowed in mode '{}'",
                archive.mode()
            )));
        }

        let guard = self.inner.operations.register(correlation.operation_id);
        archive.enqueue(Task {
            correlation,
            handle,
            guard,
            kind: TaskKind::GetEntries,
        });
        Ok(())
    }

    /// Queues looking up one entry descriptor by name.
    ///
    /// The lookup applies the directory-suffix fallback; a miss is reported
    /// asynchronously as a `NotFound` failure event.
    pub fn get_entry_by_name(
        &self,
        handle: Handle,
        name: &str,
        correlation: Correlation,
    ) -> Result<()> {
        let archive = self.get(handle)?;
        if !archive.allows(ArchiveFunction::GetEntryByName) {
            return Err(Error::InvalidValues(format!(
                "getEntryByName not allowed in mode '{}'",
                archive.mode()
            )));
        }

        let guard = self.inner.operations.register(correlation.operation_id);
        archive.enqueue(Task {
            correlation,
            handle,
            guard,
            kind: TaskKind::GetEntryByName {
                name: name.to_string(),
            },
        });
        Ok(())
    }

    /// Queues extracting one entry (a whole subtree for directory entries)
    /// into `destination_dir`.
    ///
    /// The entry is looked up synchronously with the directory-suffix
    /// fallback; a miss fails immediately with [`Error::NotFound`].
    pub fn extract(
        &self,
        handle: Handle,
        name: &str,
        destination_dir: &str,
        options: ExtractOptions,
        correlation: Correlation,
    ) -> Result<()> {
        let archive = self.get(handle)?;

        let entry = archive
            .lookup_entry(name)
            .ok_or_else(|| Error::NotFound(format!("entry not found: {}", name)))?;
        let destination = self.resolve_destination(destination_dir)?;

        let guard = self.inner.operations.register(correlation.operation_id);
        archive.enqueue(Task {
            correlation,
            handle,
            guard,
            kind: TaskKind::Extract {
                entry_name: entry.name,
                destination,
                strip_name: options.strip_name,
                overwrite: options.overwrite,
            },
        });
        Ok(())
    }

    /// Closes the archive under `handle` and unregisters it.
    ///
    /// Waits for an in-flight operation to finish first. Closing an unmapped
    /// handle reports success; a second close is a no-op by contract.
    pub fn close(&self, handle: Handle) -> Result<()> {
        match self.get(handle) {
            Ok(archive) => {
                archive.close();
                self.erase(handle);
            }
            Err(_) => {
                debug!("close called on already closed handle {}", handle);
            }
        }
        Ok(())
    }

    /// Marks the operation as canceled.
    ///
    /// A queued operation is dropped before it starts; a running one stops at
    /// its next chunk boundary. Neither posts a success event. Unknown ids
    /// are ignored.
    pub fn abort(&self, operation_id: OperationId) {
        self.inner.operations.abort(operation_id);
    }

    pub(crate) fn erase(&self, handle: Handle) {
        self.inner.registry.lock().unwrap().archives.remove(&handle);
    }

    fn resolve_destination(&self, destination_dir: &str) -> Result<Node> {
        let path = NodePath::new(destination_dir)?;
        let mut node = Node::resolve(&path)?;
        if node.node_type() != NodeType::Directory {
            return Err(Error::InvalidValues(format!(
                "destination is not a directory: {}",
                path
            )));
        }
        node.set_permissions(VirtualPerms::READ_WRITE);
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_get_unmapped_handle_is_not_found() {
        let (tx, _rx) = mpsc::channel();
        let manager = ArchiveManager::new(tx);
        assert!(matches!(manager.get(42), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_close_unmapped_handle_is_ok() {
        let (tx, _rx) = mpsc::channel();
        let manager = ArchiveManager::new(tx);
        assert!(manager.close(42).is_ok());
    }

    #[test]
    fn test_abort_unknown_operation_is_ignored() {
        let (tx, _rx) = mpsc::channel();
        let manager = ArchiveManager::new(tx);
        manager.abort(7);
    }

    #[test]
    fn test_open_missing_file_read_mode() {
        let (tx, _rx) = mpsc::channel();
        let manager = ArchiveManager::new(tx);
        let err = manager
            .open(OpenRequest::new("/definitely/not/here.zip", FileMode::Read))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
