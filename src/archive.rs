//! Open archive state and per-archive operation execution.
//!
//! An [`ArchiveFile`] represents one opened archive: its mode, overwrite
//! policy, backing [`Node`], and entry set. Operations against the codec are
//! queued on a per-archive FIFO and drained by a single worker thread,
//! spawned when the queue becomes non-empty and exiting once it drains — so
//! operations on one handle never run concurrently with each other.
//!
//! [`close`] takes the same execution lock a running task holds, so closing
//! cannot interleave with an in-flight operation; tasks drained after the
//! close fail with `ServiceNotAvailable`.
//!
//! [`close`]: ArchiveFile::close

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, warn};

use crate::codec::{self, AddItem};
use crate::entry::{ArchiveEntry, EntrySet};
use crate::manager::{ArchiveManager, Handle};
use crate::mode::FileMode;
use crate::node::{Node, NodeType};
use crate::operation::{CancellationGuard, Correlation, Event, EventSink, Outcome};
use crate::{Error, Result};

/// The gated archive operations.
///
/// Which of these a handle may perform is fixed at open time from the file
/// mode and never changes. Single-entry extraction is not in the table,
/// matching the platform layer this crate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFunction {
    /// Appending new entries.
    Add,
    /// Extracting every entry.
    ExtractAll,
    /// Listing the entry set.
    GetEntries,
    /// Looking a single entry up by name.
    GetEntryByName,
}

/// What a queued task should do; resolved arguments only, no raw input.
pub(crate) enum TaskKind {
    Open {
        manager: ArchiveManager,
    },
    Add {
        source: Node,
        base_path: String,
    },
    ExtractAll {
        destination: Node,
        overwrite: bool,
    },
    GetEntries,
    GetEntryByName {
        name: String,
    },
    Extract {
        entry_name: String,
        destination: Node,
        strip_name: bool,
        overwrite: bool,
    },
}

/// One queued unit of work on an archive.
pub(crate) struct Task {
    pub correlation: Correlation,
    pub handle: Handle,
    pub guard: CancellationGuard,
    pub kind: TaskKind,
}

#[derive(Debug, Default)]
struct ArchiveState {
    is_open: bool,
    created_as_new_empty: bool,
    decompressed_size: u64,
    entries: EntrySet,
}

#[derive(Default)]
struct TaskQueue {
    tasks: VecDeque<Task>,
    worker_active: bool,
}

/// One opened archive, registered in the [`ArchiveManager`] under a handle.
pub struct ArchiveFile {
    mode: FileMode,
    overwrite: bool,
    node: Node,
    sink: Arc<dyn EventSink>,
    state: Mutex<ArchiveState>,
    queue: Mutex<TaskQueue>,
    /// Held for the duration of one task execution and by `close`.
    exec: Mutex<()>,
}

impl ArchiveFile {
    pub(crate) fn new(
        mode: FileMode,
        overwrite: bool,
        node: Node,
        created_as_new_empty: bool,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            mode,
            overwrite,
            node,
            sink,
            state: Mutex::new(ArchiveState {
                created_as_new_empty,
                ..ArchiveState::default()
            }),
            queue: Mutex::new(TaskQueue::default()),
            exec: Mutex::new(()),
        })
    }

    /// Returns the mode the archive was opened with.
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Returns the overwrite flag recorded at open time.
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Returns the backing file's path node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Returns `true` while the archive accepts operations.
    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().is_open
    }

    /// Returns `true` if `function` is permitted by the open mode.
    ///
    /// The mapping is fixed at open time: `add` needs a writing mode, the
    /// read operations need a reading mode.
    pub fn allows(&self, function: ArchiveFunction) -> bool {
        match function {
            ArchiveFunction::Add => matches!(
                self.mode,
                FileMode::Write | FileMode::ReadWrite | FileMode::Add
            ),
            ArchiveFunction::ExtractAll
            | ArchiveFunction::GetEntries
            | ArchiveFunction::GetEntryByName => {
                matches!(self.mode, FileMode::Read | FileMode::ReadWrite)
            }
        }
    }

    /// Looks up an entry by name with the directory-suffix fallback,
    /// returning a copy.
    pub fn lookup_entry(&self, name: &str) -> Option<ArchiveEntry> {
        self.state.lock().unwrap().entries.lookup(name).cloned()
    }

    /// Returns the total uncompressed size recorded at the last entry-list
    /// refresh.
    pub fn decompressed_size(&self) -> u64 {
        self.state.lock().unwrap().decompressed_size
    }

    /// Marks the archive closed. Waits for an in-flight operation to finish;
    /// closing an already-closed archive is a no-op.
    pub fn close(&self) {
        let _exec = self.exec.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        if !state.is_open {
            debug!("archive {} already closed", self.node.path());
        }
        state.is_open = false;
    }

    /// Queues a task, spawning the drain worker if none is running.
    pub(crate) fn enqueue(self: &Arc<Self>, task: Task) {
        let mut queue = self.queue.lock().unwrap();
        queue.tasks.push_back(task);
        if !queue.worker_active {
            queue.worker_active = true;
            let archive = Arc::clone(self);
            thread::spawn(move || archive.drain_queue());
        }
    }

    fn drain_queue(self: Arc<Self>) {
        loop {
            let task = {
                let mut queue = self.queue.lock().unwrap();
                match queue.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        queue.worker_active = false;
                        return;
                    }
                }
            };
            self.run_task(task);
        }
    }

    fn run_task(&self, task: Task) {
        let _exec = self.exec.lock().unwrap();

        if task.guard.is_canceled() {
            // A canceled operation reports nothing; an unopened archive from
            // a canceled open must not stay registered.
            debug!("dropping canceled operation on {}", self.node.path());
            if let TaskKind::Open { manager } = task.kind {
                manager.erase(task.handle);
            }
            return;
        }

        let is_open_task = matches!(task.kind, TaskKind::Open { .. });
        if !is_open_task && !self.state.lock().unwrap().is_open {
            self.sink.post(Event::Failed {
                correlation: task.correlation,
                error: Error::ServiceNotAvailable("archive is closed".to_string()),
            });
            return;
        }

        let correlation = task.correlation;
        let handle = task.handle;
        let guard = task.guard;
        let sink = Arc::clone(&self.sink);
        let mut progress = |value: f64, name: &str| -> bool {
            if guard.is_canceled() {
                return false;
            }
            sink.post(Event::Progress {
                correlation,
                handle,
                value,
                name: name.to_string(),
            });
            true
        };

        let result = match task.kind {
            TaskKind::Open { ref manager } => self.run_open(handle, manager),
            TaskKind::Add { source, base_path } => {
                self.run_add(&source, &base_path, &mut progress)
            }
            TaskKind::ExtractAll {
                destination,
                overwrite,
            } => self.run_extract_all(&destination, overwrite, &mut progress),
            TaskKind::GetEntries => {
                Ok(Outcome::Entries(self.state.lock().unwrap().entries.to_vec()))
            }
            TaskKind::GetEntryByName { name } => self.run_entry_by_name(&name),
            TaskKind::Extract {
                entry_name,
                destination,
                strip_name,
                overwrite,
            } => self.run_extract(&entry_name, &destination, strip_name, overwrite, &mut progress),
        };

        match result {
            Ok(outcome) => self.sink.post(Event::Completed {
                correlation,
                outcome,
            }),
            Err(Error::Canceled) => {
                debug!("operation on {} canceled mid-flight", self.node.path());
            }
            Err(error) => {
                error!("operation on {} failed: {}", self.node.path(), error);
                self.sink.post(Event::Failed { correlation, error });
            }
        }
    }

    /// Opens the backing file: a zero-byte file this open created becomes an
    /// empty archive; any other zero-byte file is not a valid container;
    /// otherwise the entry list is read through the codec.
    fn run_open(&self, handle: Handle, manager: &ArchiveManager) -> Result<Outcome> {
        let opened = (|| {
            let size = self.node.size()?;
            let mut state = self.state.lock().unwrap();
            if size == 0 {
                if !state.created_as_new_empty {
                    return Err(Error::InvalidValues("invalid zip archive".to_string()));
                }
                debug!("opened new empty archive {}", self.node.path());
                state.entries = EntrySet::new();
                state.decompressed_size = 0;
                state.is_open = true;
                return Ok(());
            }
            state.is_open = true;
            drop(state);
            self.refresh_entries()
        })();

        match opened {
            Ok(()) => Ok(Outcome::Opened {
                handle,
                mode: self.mode,
            }),
            Err(e) => {
                // The handle was handed out optimistically; a failed open
                // must not leave it resolvable.
                manager.erase(handle);
                Err(e)
            }
        }
    }

    fn run_add(
        &self,
        source: &Node,
        base_path: &str,
        progress: &mut codec::ProgressFn<'_>,
    ) -> Result<Outcome> {
        let mut prefix = base_path.to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        let mut items = Vec::new();
        collect_add_items(source, &prefix, &mut items)?;
        codec::append(self.node.path(), &items, progress)?;

        // The archive is a valid container from now on; refresh what the
        // codec sees so a following get_entries reports the new entries.
        self.state.lock().unwrap().created_as_new_empty = false;
        self.refresh_entries()?;
        Ok(Outcome::Done)
    }

    fn run_extract_all(
        &self,
        destination: &Node,
        overwrite: bool,
        progress: &mut codec::ProgressFn<'_>,
    ) -> Result<Outcome> {
        let size = self.node.size()?;
        if size == 0 {
            if self.state.lock().unwrap().created_as_new_empty {
                // Nothing to extract, and no entries to report progress for.
                return Ok(Outcome::Done);
            }
            return Err(Error::InvalidState(
                "file is not a valid zip archive".to_string(),
            ));
        }
        codec::extract(
            self.node.path(),
            destination.path(),
            None,
            "",
            overwrite,
            progress,
        )?;
        Ok(Outcome::Done)
    }

    fn run_entry_by_name(&self, name: &str) -> Result<Outcome> {
        match self.state.lock().unwrap().entries.lookup(name) {
            Some(entry) => Ok(Outcome::Entry(entry.clone())),
            None => Err(Error::NotFound(format!("entry not found: {}", name))),
        }
    }

    fn run_extract(
        &self,
        entry_name: &str,
        destination: &Node,
        strip_name: bool,
        overwrite: bool,
        progress: &mut codec::ProgressFn<'_>,
    ) -> Result<Outcome> {
        let strip_base = if strip_name {
            base_path_of(entry_name)
        } else {
            String::new()
        };
        let matched = codec::extract(
            self.node.path(),
            destination.path(),
            Some(entry_name),
            &strip_base,
            overwrite,
            progress,
        )?;
        if matched == 0 {
            return Err(Error::NotFound(format!("entry not found: {}", entry_name)));
        }
        Ok(Outcome::Done)
    }

    fn refresh_entries(&self) -> Result<()> {
        let (decompressed_size, entries) = codec::list_entries(self.node.path())?;
        let mut state = self.state.lock().unwrap();
        state.decompressed_size = decompressed_size;
        state.entries = entries;
        Ok(())
    }
}

/// Returns the parent portion of a stored entry name, trailing separator
/// included; empty when the entry sits at the archive root.
fn base_path_of(entry_name: &str) -> String {
    let trimmed = entry_name.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => String::new(),
    }
}

/// Expands a source node into add items: a file becomes one entry, a
/// directory becomes a directory entry plus its whole subtree (children that
/// fail to resolve were already skipped during enumeration).
fn collect_add_items(source: &Node, base_prefix: &str, items: &mut Vec<AddItem>) -> Result<()> {
    let full = source.path().full_path();
    let relative = full.strip_prefix(base_prefix).unwrap_or_else(|| {
        warn!("base path {:?} is not a prefix of {:?}", base_prefix, full);
        full
    });

    match source.node_type() {
        NodeType::File => items.push(AddItem {
            node: source.clone(),
            entry_name: relative.to_string(),
        }),
        NodeType::Directory => {
            items.push(AddItem {
                node: source.clone(),
                entry_name: format!("{}/", relative),
            });
            for child in source.children()? {
                collect_add_items(&child, base_prefix, items)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_path_of() {
        assert_eq!(base_path_of("a/b.txt"), "a/");
        assert_eq!(base_path_of("a/b/c.txt"), "a/b/");
        assert_eq!(base_path_of("top.txt"), "");
        assert_eq!(base_path_of("dir/sub/"), "dir/");
        assert_eq!(base_path_of("dir/"), "");
    }

    #[test]
    fn test_allowed_operations_by_mode() {
        use crate::node::Node;
        use crate::path::NodePath;
        use std::sync::mpsc;
        use ArchiveFunction::*;

        let tmp = std::env::temp_dir();
        let node = Node::resolve(&NodePath::new(tmp.to_str().unwrap()).unwrap()).unwrap();

        // mode -> (add, extract_all, get_entries, get_entry_by_name)
        let table = [
            (FileMode::Read, [false, true, true, true]),
            (FileMode::Write, [true, false, false, false]),
            (FileMode::ReadWrite, [true, true, true, true]),
            (FileMode::Add, [true, false, false, false]),
        ];
        for (mode, expected) in table {
            let (tx, _rx) = mpsc::channel();
            let archive = ArchiveFile::new(mode, false, node.clone(), false, Arc::new(tx));
            let functions = [Add, ExtractAll, GetEntries, GetEntryByName];
            for (function, expect) in functions.into_iter().zip(expected) {
                assert_eq!(
                    archive.allows(function),
                    expect,
                    "{:?} / {:?}",
                    mode,
                    function
                );
            }
        }
    }
}
