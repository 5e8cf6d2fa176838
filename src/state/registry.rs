//! The process-wide (here: thread-local, §5) key → state map (§4.3).
//!
//! Grounded on `live_cells/stateful_cell.py`'s `GlobalStateMap`. The
//! registry is `thread_local!` rather than a shared global because the
//! engine is explicitly single-threaded cooperative (§5): confining it to
//! one OS thread via `thread_local!` is the same guarantee Python gets for
//! free from its single-threaded interpreter loop.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::key::Key;

thread_local! {
    static STATES: RefCell<FxHashMap<Key, Rc<dyn Any>>> = RefCell::new(FxHashMap::default());
}

/// Retrieve the state for `key`, creating it with `factory` if absent
/// (§4.3 `StateRegistry::get`). When `key` is `None`, `factory` is called
/// and its result is *not* stored — each call gets an unshared state.
pub fn get<S: 'static>(key: Option<&Key>, factory: impl FnOnce() -> Rc<S>) -> Rc<S> {
    let Some(key) = key else {
        return factory();
    };

    if let Some(existing) = STATES.with(|m| m.borrow().get(key).cloned()) {
        return existing
            .downcast::<S>()
            .expect("registry state type mismatch for key — two cell kinds shared one key");
    }

    let state = factory();
    STATES.with(|m| {
        m.borrow_mut()
            .insert(key.clone(), state.clone() as Rc<dyn Any>);
    });
    state
}

/// Look up the state for `key` without creating it.
pub fn maybe_get<S: 'static>(key: &Key) -> Option<Rc<S>> {
    STATES.with(|m| m.borrow().get(key).cloned())?
        .downcast::<S>()
        .ok()
}

/// Evict `key`'s entry (§4.3 `StateRegistry::remove`, called on dispose).
pub fn remove(key: &Key) {
    STATES.with(|m| {
        m.borrow_mut().remove(key);
    });
}

#[cfg(test)]
pub(crate) fn len() -> usize {
    STATES.with(|m| m.borrow().len())
}
