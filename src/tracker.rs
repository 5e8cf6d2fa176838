//! The ambient "currently-computing" context (§4.2).
//!
//! Grounded on `live_cells/tracking.py`'s `ArgumentTracker`, which uses a
//! `contextvars.ContextVar` so the tracker is re-entrant and restores the
//! previous value on scope exit even across exceptions. The Rust
//! equivalent is a `thread_local!` stack with an RAII guard: pushing a
//! frame returns a [`TrackerGuard`] whose `Drop` pops it, which survives
//! early return and `?` the same way Python's `contextmanager` survives an
//! exception unwinding through the `with` block.

use std::cell::RefCell;
use std::rc::Rc;

use crate::state::Observable;

/// A dependency-recording callback: called with the `Observable` a
/// computation read via [`crate::cell::Cell::call`].
pub type Tracker = Rc<dyn Fn(Rc<dyn Observable>)>;

thread_local! {
    // `None` entries model Python's "tracker installed but set to None"
    // (i.e. `without_tracker`): reads still go through `call()` but no
    // dependency is recorded.
    static STACK: RefCell<Vec<Option<Tracker>>> = const { RefCell::new(Vec::new()) };
}

/// RAII scope guard: pops the tracker pushed by [`push`] when dropped.
pub struct TrackerGuard {
    _private: (),
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// Install `tracker` as the active dependency recorder for the lifetime of
/// the returned guard. Nested calls push/pop correctly (re-entry, §4.2
/// implementation note), each computed evaluation getting its own frame.
#[must_use]
pub fn push(tracker: Tracker) -> TrackerGuard {
    STACK.with(|s| s.borrow_mut().push(Some(tracker)));
    TrackerGuard { _private: () }
}

/// Install a null tracker: reads within this scope do not record
/// dependencies upward, even if an outer tracker is active (§4.2
/// `without_tracker`).
#[must_use]
pub fn push_none() -> TrackerGuard {
    STACK.with(|s| s.borrow_mut().push(None));
    TrackerGuard { _private: () }
}

/// Run `f` with no active tracker installed.
pub fn without_tracker<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_none();
    f()
}

/// If a tracker is active, call it with `arg` (§4.2 `ArgumentTracker.track`).
/// Used by [`crate::cell::Cell::call`] to turn a read into a dependency
/// edge.
pub fn track(arg: Rc<dyn Observable>) {
    let tracker = STACK.with(|s| s.borrow().last().cloned().flatten());
    if let Some(tracker) = tracker {
        tracker(arg);
    }
}
