//! The batch protocol (§4.7 "Batch as a scoped acquisition").
//!
//! Grounded on `live_cells/mutable_cell.py`'s `MutableCellState._is_batch`/
//! `_batched` class state and its `batch()` context manager. Python tracks
//! re-entrancy with a single boolean (`batching = not _is_batch`); this
//! uses a depth counter instead, which gives the same "nested batches are
//! no-ops with respect to `begin`" behaviour without needing a second
//! thread-local for the boolean.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// A mutable cell state with a deferred `notify_update` waiting for the
/// enclosing batch to close.
pub(crate) trait BatchedState {
    fn flush_update(&self);
}

struct BatchState {
    depth: u32,
    // Keyed by state identity so setting the same cell twice within one
    // batch still only fires one `notify_update` (mirrors `_batched` being
    // a `set`, not a list).
    queued: FxHashMap<usize, Rc<dyn BatchedState>>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            depth: 0,
            queued: FxHashMap::default(),
        }
    }
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Is a batch currently open? Consulted by [`crate::mutable::MutableCellState`]
/// to decide whether to defer its `notify_update`.
pub(crate) fn is_active() -> bool {
    BATCH.with(|b| b.borrow().depth > 0)
}

/// Record `state` as having changed during the current batch, keyed by
/// `id` so repeat mutations of the same cell coalesce.
pub(crate) fn enqueue(id: usize, state: Rc<dyn BatchedState>) {
    BATCH.with(|b| {
        b.borrow_mut().queued.entry(id).or_insert(state);
    });
}

fn flush() {
    let queued = BATCH.with(|b| std::mem::take(&mut b.borrow_mut().queued));
    for (_, state) in queued {
        state.flush_update();
    }
}

/// RAII handle for an open batch scope (§4.7 `begin_batch`/`end_batch`).
/// Dropping the outermost guard flushes every cell queued since it was
/// opened, each getting exactly one `notify_update`.
#[must_use = "a batch has no effect unless its guard is held for the scope of the mutations"]
pub struct BatchGuard {
    _private: (),
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let should_flush = BATCH.with(|b| {
            let mut b = b.borrow_mut();
            b.depth -= 1;
            b.depth == 0
        });

        if should_flush {
            flush();
        }
    }
}

/// Open a batch scope (§6 `batch()`). Mutations to mutable cells made while
/// the returned guard is alive are coalesced into a single update cycle per
/// cell, delivered when the outermost guard for the current nesting level
/// is dropped.
///
/// ```ignore
/// {
///     let _b = batch();
///     a.set(1);
///     b.set(2);
/// } // observers of downstream computed cells see exactly one update
/// ```
pub fn batch() -> BatchGuard {
    BATCH.with(|b| b.borrow_mut().depth += 1);
    BatchGuard { _private: () }
}

/// Run `f` with a batch scope open for its entire duration (§6 `batched()`).
pub fn batched<R>(f: impl FnOnce() -> R) -> R {
    let _guard = batch();
    f()
}
