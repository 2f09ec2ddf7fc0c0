//! # zipnode
//!
//! A handle-based zip archive manager layered over a virtual filesystem
//! node abstraction.
//!
//! The crate has two halves:
//!
//! - **Path/node layer**: [`NodePath`] is an immutable, normalized path
//!   value; [`Node`] is the result of resolving one against the real
//!   filesystem, carrying a *virtual* read/write mask independent of OS
//!   permissions. Nodes resolve, enumerate, create, and remove entries,
//!   translating OS errors into the crate's typed [`Error`] taxonomy.
//! - **Archive layer**: [`ArchiveManager`] maps opaque integer handles to
//!   open [`ArchiveFile`]s. Opening resolves (or creates) the backing file
//!   synchronously; listing, adding, and extracting run on a per-archive
//!   worker and report progress and completion through an [`EventSink`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use zipnode::{ArchiveManager, Correlation, Event, FileMode, OpenRequest};
//!
//! fn main() -> zipnode::Result<()> {
//!     let (tx, rx) = mpsc::channel();
//!     let manager = ArchiveManager::new(tx);
//!
//!     // Create a fresh archive and append a file.
//!     let handle = manager.open(
//!         OpenRequest::new("/tmp/backup.zip", FileMode::Write)
//!             .correlation(Correlation::new(1).with_operation(100)),
//!     )?;
//!     manager.add(handle, "/tmp/data.txt", Correlation::new(2).with_operation(101))?;
//!
//!     // Progress events arrive before the completion event.
//!     for event in rx.iter() {
//!         match event {
//!             Event::Progress { value, name, .. } => {
//!                 println!("{:5.1}% {}", value * 100.0, name);
//!             }
//!             Event::Completed { correlation, .. } if correlation.callback_id == 2 => break,
//!             Event::Failed { error, .. } => return Err(error),
//!             _ => {}
//!         }
//!     }
//!
//!     manager.close(handle)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Contracts worth knowing
//!
//! - Operations on one handle are serialized by a per-archive FIFO worker;
//!   `close` waits for an in-flight operation instead of racing it.
//! - Synchronous failures (unknown handle, disallowed operation, missing
//!   entry or path) are returned directly from the manager call; failures
//!   after queueing arrive as [`Event::Failed`].
//! - Directory enumeration skips children that fail to resolve rather than
//!   aborting; recursive removal applies the same policy.
//! - `close` is idempotent: closing an already-closed handle reports
//!   success.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Buffer size for chunked codec I/O (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive;
pub(crate) mod codec;
pub mod entry;
pub mod error;
pub mod manager;
pub mod mode;
pub mod node;
pub mod operation;
pub mod path;
pub mod progress;
pub mod timestamp;

pub use archive::{ArchiveFile, ArchiveFunction};
pub use entry::{ArchiveEntry, EntrySet};
pub use error::{Error, Result};
pub use manager::{ArchiveManager, ExtractOptions, Handle, OpenRequest};
pub use mode::FileMode;
pub use node::{Node, NodeType, VirtualPerms};
pub use operation::{CallbackId, Correlation, Event, EventSink, Outcome, OperationId};
pub use path::{NodePath, SEPARATOR};
pub use progress::ProgressTracker;
