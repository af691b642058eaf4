//! Race-free cancellation of in-flight transport operations.
//!
//! # Design
//! `CancellableHandle` is returned to the caller before the transport
//! operation exists. The dispatcher keeps a `Binder` to the same state and
//! binds the operation once the transport hands it over. Both `cancel` and
//! `bind` run inside one mutex, so a cancel issued before binding is applied
//! to the operation the moment it is bound and can never be lost between the
//! check and the store.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An in-flight transport operation that can be told to stop.
pub trait Operation: Send + 'static {
    /// Ask the operation to stop. Runs under the handle's lock, so it must not
    /// block on I/O or deliver the operation's completion synchronously. May
    /// be called more than once.
    fn cancel(&self);
}

/// Observable lifecycle of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No operation yet, no cancel requested.
    Unbound,
    /// No operation yet, cancel already requested.
    CancelRequested,
    /// Operation bound and running.
    Active,
    /// Operation bound and told to stop.
    Cancelled,
    /// The transport reported completion.
    Completed,
}

#[derive(Default)]
struct Slot {
    cancelled: bool,
    bound: bool,
    completed: bool,
    operation: Option<Box<dyn Operation>>,
}

impl Slot {
    fn state(&self) -> HandleState {
        match (self.bound, self.completed, self.cancelled) {
            (_, true, _) => HandleState::Completed,
            (false, false, false) => HandleState::Unbound,
            (false, false, true) => HandleState::CancelRequested,
            (true, false, false) => HandleState::Active,
            (true, false, true) => HandleState::Cancelled,
        }
    }
}

type Shared = Arc<Mutex<Slot>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Slot> {
    // Every critical section leaves the slot consistent, so a poisoned lock
    // still holds valid state.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caller-side handle to a request submitted through the dispatcher.
pub struct CancellableHandle {
    shared: Shared,
}

impl CancellableHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Request cancellation. If the operation is already bound it is
    /// cancelled now; otherwise it is cancelled as soon as it is bound.
    ///
    /// Cancellation is best-effort: the completion still fires, normally with
    /// a cancelled transport error.
    pub fn cancel(&self) {
        let mut slot = lock(&self.shared);
        slot.cancelled = true;
        if let Some(operation) = slot.operation.as_ref() {
            operation.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.shared).cancelled
    }

    pub fn state(&self) -> HandleState {
        lock(&self.shared).state()
    }

    /// A binder for the producer side of this handle.
    pub fn binder(&self) -> Binder {
        Binder {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for CancellableHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Producer side of a `CancellableHandle`.
#[derive(Clone)]
pub struct Binder {
    shared: Shared,
}

impl Binder {
    /// Attach the transport operation. Only the first call succeeds; a second
    /// operation is handed back untouched.
    ///
    /// If cancel was already requested the operation is cancelled before the
    /// lock is released.
    pub fn bind(&self, operation: Box<dyn Operation>) -> Result<(), Box<dyn Operation>> {
        let mut slot = lock(&self.shared);
        if slot.bound {
            return Err(operation);
        }
        slot.bound = true;
        if slot.cancelled && !slot.completed {
            operation.cancel();
        }
        if !slot.completed {
            slot.operation = Some(operation);
        }
        Ok(())
    }

    /// Record that the transport finished and release the operation.
    pub fn complete(&self) {
        let mut slot = lock(&self.shared);
        slot.completed = true;
        slot.operation = None;
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("state", &lock(&self.shared).state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[derive(Clone, Default)]
    struct CountingOperation {
        cancels: Arc<AtomicUsize>,
    }

    impl Operation for CountingOperation {
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingOperation {
        fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn cancel_before_bind_cancels_on_bind() {
        let handle = CancellableHandle::new();
        handle.cancel();
        assert_eq!(handle.state(), HandleState::CancelRequested);

        let op = CountingOperation::default();
        handle.binder().bind(Box::new(op.clone())).ok().unwrap();
        assert_eq!(op.cancels(), 1);
        assert_eq!(handle.state(), HandleState::Cancelled);
    }

    #[test]
    fn cancel_after_bind_cancels_immediately() {
        let handle = CancellableHandle::new();
        let op = CountingOperation::default();
        handle.binder().bind(Box::new(op.clone())).ok().unwrap();
        assert_eq!(handle.state(), HandleState::Active);
        assert_eq!(op.cancels(), 0);

        handle.cancel();
        assert_eq!(op.cancels(), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn rebinding_is_rejected() {
        let handle = CancellableHandle::new();
        let binder = handle.binder();
        let first = CountingOperation::default();
        let second = CountingOperation::default();
        assert!(binder.bind(Box::new(first.clone())).is_ok());
        assert!(binder.bind(Box::new(second.clone())).is_err());

        handle.cancel();
        assert_eq!(first.cancels(), 1);
        assert_eq!(second.cancels(), 0);
    }

    #[test]
    fn completion_releases_operation() {
        let handle = CancellableHandle::new();
        let binder = handle.binder();
        let op = CountingOperation::default();
        binder.bind(Box::new(op.clone())).ok().unwrap();
        binder.complete();
        assert_eq!(handle.state(), HandleState::Completed);

        handle.cancel();
        assert_eq!(op.cancels(), 0);
    }

    #[test]
    fn completion_before_bind_still_counts_as_bound() {
        let handle = CancellableHandle::new();
        let binder = handle.binder();
        binder.complete();
        let op = CountingOperation::default();
        assert!(binder.bind(Box::new(op.clone())).is_ok());
        assert!(binder.bind(Box::new(op.clone())).is_err());
        assert_eq!(handle.state(), HandleState::Completed);
    }

    #[test]
    fn racing_cancel_and_bind_never_loses_cancellation() {
        for _ in 0..2_000 {
            let handle = CancellableHandle::new();
            let binder = handle.binder();
            let op = CountingOperation::default();
            let barrier = Arc::new(Barrier::new(2));

            let bind_side = {
                let barrier = Arc::clone(&barrier);
                let op = op.clone();
                thread::spawn(move || {
                    barrier.wait();
                    binder.bind(Box::new(op)).ok().unwrap();
                })
            };
            barrier.wait();
            handle.cancel();
            bind_side.join().unwrap();

            assert_eq!(op.cancels(), 1);
            assert_eq!(handle.state(), HandleState::Cancelled);
        }
    }

    #[test]
    fn racing_bind_then_cancel_never_loses_cancellation() {
        for _ in 0..2_000 {
            let handle = Arc::new(CancellableHandle::new());
            let binder = handle.binder();
            let op = CountingOperation::default();
            let barrier = Arc::new(Barrier::new(2));

            let cancel_side = {
                let barrier = Arc::clone(&barrier);
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    barrier.wait();
                    handle.cancel();
                })
            };
            barrier.wait();
            binder.bind(Box::new(op.clone())).ok().unwrap();
            cancel_side.join().unwrap();

            assert_eq!(op.cancels(), 1);
        }
    }
}
