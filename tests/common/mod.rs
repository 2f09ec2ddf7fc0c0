//! Shared helpers for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use zipnode::{
    ArchiveManager, CallbackId, Correlation, Error, Event, FileMode, Handle, OpenRequest, Outcome,
};

/// How long a test waits for one asynchronous completion.
pub const WAIT: Duration = Duration::from_secs(30);

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// Returns a process-unique correlation with both ids set.
pub fn correlation() -> Correlation {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    Correlation::new(id).with_operation(1_000_000 + id)
}

/// Creates a manager wired to a channel sink.
pub fn manager() -> (ArchiveManager, Receiver<Event>) {
    let (tx, rx) = std::sync::mpsc::channel();
    (ArchiveManager::new(tx), rx)
}

/// Drains events until the completion for `callback_id` arrives.
///
/// Progress events for any operation are skipped. Panics on timeout.
pub fn wait(rx: &Receiver<Event>, callback_id: CallbackId) -> Result<Outcome, Error> {
    loop {
        match rx.recv_timeout(WAIT) {
            Ok(Event::Completed { correlation, outcome }) if correlation.callback_id == callback_id => {
                return Ok(outcome);
            }
            Ok(Event::Failed { correlation, error }) if correlation.callback_id == callback_id => {
                return Err(error);
            }
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                panic!("timed out waiting for completion of callback {}", callback_id)
            }
            Err(RecvTimeoutError::Disconnected) => {
                panic!("event channel closed before callback {} completed", callback_id)
            }
        }
    }
}

/// Like [`wait`], also returning the progress fractions seen for the same
/// operation before it completed.
pub fn wait_with_progress(
    rx: &Receiver<Event>,
    callback_id: CallbackId,
) -> (Vec<f64>, Result<Outcome, Error>) {
    let mut fractions = Vec::new();
    loop {
        match rx.recv_timeout(WAIT) {
            Ok(Event::Progress { correlation, value, .. })
                if correlation.callback_id == callback_id =>
            {
                fractions.push(value);
            }
            Ok(Event::Completed { correlation, outcome }) if correlation.callback_id == callback_id => {
                return (fractions, Ok(outcome));
            }
            Ok(Event::Failed { correlation, error }) if correlation.callback_id == callback_id => {
                return (fractions, Err(error));
            }
            Ok(_) => continue,
            Err(e) => panic!("waiting for callback {}: {:?}", callback_id, e),
        }
    }
}

/// Writes `contents` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write fixture file");
    path
}

/// Opens an archive and waits for the open completion, returning the handle.
pub fn open_and_wait(
    manager: &ArchiveManager,
    rx: &Receiver<Event>,
    path: &Path,
    mode: FileMode,
    overwrite: bool,
) -> Handle {
    let c = correlation();
    let handle = manager
        .open(
            OpenRequest::new(path.to_str().unwrap(), mode)
                .overwrite(overwrite)
                .correlation(c),
        )
        .expect("open request failed synchronously");
    match wait(rx, c.callback_id) {
        Ok(Outcome::Opened { handle: h, mode: m }) => {
            assert_eq!(h, handle);
            assert_eq!(m, mode);
        }
        other => panic!("unexpected open result: {:?}", other),
    }
    handle
}

/// Adds one source and waits for the completion.
pub fn add_and_wait(
    manager: &ArchiveManager,
    rx: &Receiver<Event>,
    handle: Handle,
    source: &Path,
) -> Result<Outcome, Error> {
    let c = correlation();
    manager.add(handle, source.to_str().unwrap(), c)?;
    wait(rx, c.callback_id)
}

/// Builds a zip at `archive` containing `sources` (paths on disk), using the
/// public API end to end.
pub fn build_zip(
    manager: &ArchiveManager,
    rx: &Receiver<Event>,
    archive: &Path,
    sources: &[&Path],
) {
    let handle = open_and_wait(manager, rx, archive, FileMode::Write, true);
    for source in sources {
        add_and_wait(manager, rx, handle, source).expect("add failed");
    }
    manager.close(handle).expect("close failed");
}

/// Returns the sorted entry names of a `get_entries` outcome.
pub fn entry_names(outcome: Outcome) -> Vec<String> {
    match outcome {
        Outcome::Entries(entries) => entries.into_iter().map(|e| e.name).collect(),
        other => panic!("expected entry list, got {:?}", other),
    }
}
