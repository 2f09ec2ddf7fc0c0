//! Operation correlation, completion events, and cancellation.
//!
//! Every queued archive operation carries a [`Correlation`]: the caller's
//! callback id plus an optional operation id. Results come back as [`Event`]s
//! posted to an [`EventSink`] — progress events first, then exactly one
//! completion ([`Event::Completed`] or [`Event::Failed`]), except for
//! canceled operations, which post nothing after the abort takes effect.
//!
//! Cancellation flags live in an [`OpRegistry`] keyed by operation id;
//! [`ArchiveManager::abort`] flips the flag and the running operation stops
//! between chunks. Operations without an operation id are not cancelable.
//!
//! [`ArchiveManager::abort`]: crate::ArchiveManager::abort

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::entry::ArchiveEntry;
use crate::manager::Handle;
use crate::mode::FileMode;
use crate::Error;

/// Caller-supplied token correlating progress and cancellation.
pub type OperationId = i64;

/// Caller-supplied token correlating completion events with requests.
pub type CallbackId = i64;

/// Correlation ids attached to one asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    /// The completion-correlation token; always present.
    pub callback_id: CallbackId,
    /// The progress/cancellation token; operations without one are not
    /// cancelable.
    pub operation_id: Option<OperationId>,
}

impl Correlation {
    /// Creates a correlation with only a callback id.
    pub fn new(callback_id: CallbackId) -> Self {
        Self {
            callback_id,
            operation_id: None,
        }
    }

    /// Attaches an operation id, making the call cancelable and
    /// progress-reporting.
    pub fn with_operation(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }
}

/// Successful result payload of a completed operation.
#[derive(Debug)]
pub enum Outcome {
    /// An archive finished opening and is registered under `handle`.
    Opened {
        /// The registry handle for subsequent calls.
        handle: Handle,
        /// The mode the archive was opened with.
        mode: FileMode,
    },
    /// The entry listing of a `get_entries` call.
    Entries(Vec<ArchiveEntry>),
    /// The single descriptor of a `get_entry_by_name` call.
    Entry(ArchiveEntry),
    /// An add / extract operation finished.
    Done,
}

/// An asynchronous notification delivered through the [`EventSink`].
#[derive(Debug)]
pub enum Event {
    /// Periodic progress of a long-running operation.
    Progress {
        /// Correlation ids of the operation.
        correlation: Correlation,
        /// The handle the operation runs against.
        handle: Handle,
        /// Overall completion fraction in `[0.0, 1.0]`.
        value: f64,
        /// Name of the entry currently being processed.
        name: String,
    },
    /// Terminal success of an operation.
    Completed {
        /// Correlation ids of the operation.
        correlation: Correlation,
        /// The result payload.
        outcome: Outcome,
    },
    /// Terminal failure of an operation that had already been queued.
    Failed {
        /// Correlation ids of the operation.
        correlation: Correlation,
        /// The failure, from the crate taxonomy.
        error: Error,
    },
}

/// Destination for asynchronous events.
///
/// The sink is the external completion queue: implementations forward events
/// back onto the caller's context. Posting must not block for long; it is
/// called from archive worker threads.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn post(&self, event: Event);
}

impl EventSink for mpsc::Sender<Event> {
    fn post(&self, event: Event) {
        // A disconnected receiver means nobody is listening anymore; events
        // are droppable by definition.
        let _ = self.send(event);
    }
}

/// Process-wide table of cancellation flags, keyed by operation id.
///
/// Entries are inserted when a cancelable operation is queued and removed by
/// the guard when it completes, so an id can be reused afterwards.
#[derive(Debug, Default)]
pub struct OpRegistry {
    flags: Mutex<HashMap<OperationId, Arc<AtomicBool>>>,
}

impl OpRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation_id` and returns a guard owning its flag.
    pub(crate) fn register(
        self: &Arc<Self>,
        operation_id: Option<OperationId>,
    ) -> CancellationGuard {
        let flag = Arc::new(AtomicBool::new(false));
        if let Some(id) = operation_id {
            self.flags.lock().unwrap().insert(id, Arc::clone(&flag));
        }
        CancellationGuard {
            registry: Arc::clone(self),
            operation_id,
            flag,
        }
    }

    /// Marks the operation as canceled; unknown ids are ignored.
    pub fn abort(&self, operation_id: OperationId) {
        match self.flags.lock().unwrap().get(&operation_id) {
            Some(flag) => flag.store(true, Ordering::Relaxed),
            None => debug!("abort: operation {} not found", operation_id),
        }
    }

    fn erase(&self, operation_id: OperationId) {
        self.flags.lock().unwrap().remove(&operation_id);
    }
}

/// Owns one operation's cancellation flag; erases the registry entry on drop.
#[derive(Debug)]
pub(crate) struct CancellationGuard {
    registry: Arc<OpRegistry>,
    operation_id: Option<OperationId>,
    flag: Arc<AtomicBool>,
}

impl CancellationGuard {
    /// Returns `true` once the operation has been aborted.
    pub(crate) fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if let Some(id) = self.operation_id {
            self.registry.erase(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_sets_flag() {
        let registry = Arc::new(OpRegistry::new());
        let guard = registry.register(Some(7));
        assert!(!guard.is_canceled());
        registry.abort(7);
        assert!(guard.is_canceled());
    }

    #[test]
    fn test_guard_erases_on_drop() {
        let registry = Arc::new(OpRegistry::new());
        {
            let _guard = registry.register(Some(7));
            assert_eq!(registry.flags.lock().unwrap().len(), 1);
        }
        assert!(registry.flags.lock().unwrap().is_empty());
        // Aborting an already-finished operation is a no-op.
        registry.abort(7);
    }

    #[test]
    fn test_operation_without_id_is_not_cancelable() {
        let registry = Arc::new(OpRegistry::new());
        let guard = registry.register(None);
        assert!(registry.flags.lock().unwrap().is_empty());
        registry.abort(1);
        assert!(!guard.is_canceled());
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (tx, rx) = mpsc::channel();
        let sink: &dyn EventSink = &tx;
        sink.post(Event::Completed {
            correlation: Correlation::new(5),
            outcome: Outcome::Done,
        });
        match rx.recv().unwrap() {
            Event::Completed { correlation, .. } => assert_eq!(correlation.callback_id, 5),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
