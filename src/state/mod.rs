//! The state layer: [`CellStateCore`] (observer multiset + lifecycle,
//! §4.4), the [`Observer`]/[`Observable`] protocol, and the keyed
//! [`registry`].
//!
//! Grounded on `live_cells/stateful_cell.py` (`CellState`, `GlobalStateMap`)
//! for the exact transition rules, and on the Design Notes' "Polymorphic
//! cell set": rather than Python's mixin inheritance, state objects here
//! are composed from a `CellStateCore` value plus free functions
//! (`add_observer`, `remove_observer`, `notify_will_update`,
//! `notify_update`) that each concrete state calls from its own
//! `Observable`/`Observer` impl. Composition over inheritance is the
//! idiomatic Rust reading of a mixin hierarchy.

pub mod propagation;
pub mod registry;

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::key::Key;

/// Identity of a registered [`Observer`], derived from the address of the
/// `Rc` allocation backing it. Stable across clones of the same `Rc`,
/// which is exactly the "same observer" notion the multiset needs for
/// add/remove pairing (§3 invariant: "adding n times requires removing n
/// times").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObserverId(usize);

impl ObserverId {
    pub fn of(observer: &Rc<dyn Observer>) -> Self {
        ObserverId(Rc::as_ptr(observer) as *const () as usize)
    }
}

/// A lightweight, debug-only handle to "the cell" passed to
/// [`Observer::will_update`]/[`Observer::update`] (§4.4, §6).
///
/// No concrete `Observer` implementation in this crate inspects the
/// referenced cell beyond identity/diagnostics — every override in the
/// original either ignores the argument or re-broadcasts its own cell —
/// so this stays a thin debug handle rather than a generic, value-typed
/// parameter that would break `Observer`'s object-safety.
#[derive(Clone, Copy)]
pub struct AnyCell<'a>(pub &'a dyn fmt::Debug);

impl fmt::Debug for AnyCell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0, f)
    }
}

/// Receives the two-phase update notifications (§4.4, §6).
pub trait Observer {
    fn will_update(&self, cell: AnyCell<'_>);
    fn update(&self, cell: AnyCell<'_>, did_change: bool);
}

/// Anything that can gain/lose observers: the public face of a
/// [`CellStateCore`]-backed state. Dependency tracking (§4.2) and the
/// watcher (§4.9) only ever need this much of a dependency cell.
pub trait Observable: fmt::Debug {
    fn add_observer(self: Rc<Self>, observer: Rc<dyn Observer>);
    fn remove_observer(self: Rc<Self>, observer_id: ObserverId);
    /// Stable identity, used by dependency sets to dedupe (§4.8's
    /// "new dependencies are added ... dependencies ... not re-encountered
    /// remain observed").
    fn observable_id(&self) -> usize;
}

/// Observer multiset + disposal bookkeeping shared by every stateful cell
/// (§3 "CellState", §4.4).
pub struct CellStateCore {
    pub key: Option<Key>,
    observers: RefCell<FxHashMap<ObserverId, (Rc<dyn Observer>, u32)>>,
    disposed: StdCell<bool>,
    notify_count: StdCell<i32>,
}

impl CellStateCore {
    pub fn new(key: Option<Key>) -> Self {
        Self {
            key,
            observers: RefCell::new(FxHashMap::default()),
            disposed: StdCell::new(false),
            notify_count: StdCell::new(0),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.borrow().is_empty()
    }
}

/// Implemented by every concrete cell state so the free functions below can
/// reach both the shared bookkeeping (`core`) and the state's own
/// `init`/`dispose` hooks (§3 invariant 1).
pub trait StatefulLifecycle {
    fn core(&self) -> &CellStateCore;

    /// Runs before the first observer is added.
    fn init(&self) {}

    /// Runs after the last observer is removed, before the state is
    /// dropped from the registry.
    fn dispose(&self) {}
}

/// Add `observer` to `this`'s multiset, running `init()` on the 0→1
/// transition (§3 invariant 1, `stateful_cell.py: CellState.add_observer`).
pub fn add_observer<T: StatefulLifecycle + ?Sized>(this: &Rc<T>, observer: Rc<dyn Observer>) {
    let core = this.core();
    assert!(!core.is_disposed(), "CellState used after disposal");

    if !core.has_observers() {
        this.init();
    }

    let id = ObserverId::of(&observer);
    let mut observers = core.observers.borrow_mut();
    let entry = observers.entry(id).or_insert((observer, 0));
    entry.1 += 1;
}

/// Remove `observer` from `this`'s multiset, running `dispose()` and
/// evicting the state from the registry on the 1→0 transition (§3
/// invariants 1–2).
pub fn remove_observer<T: StatefulLifecycle + ?Sized>(this: &Rc<T>, observer_id: ObserverId) {
    let core = this.core();
    assert!(!core.is_disposed(), "CellState used after disposal");

    let mut now_empty = false;
    {
        let mut observers = core.observers.borrow_mut();
        if let Some(entry) = observers.get_mut(&observer_id) {
            if entry.1 > 1 {
                entry.1 -= 1;
            } else {
                observers.remove(&observer_id);
                now_empty = observers.is_empty();
            }
        }
    }

    if now_empty {
        core.disposed.set(true);
        this.dispose();
        if let Some(key) = &core.key {
            registry::remove(key);
        }
        tracing::trace!(key = ?core.key, "cell state disposed");
    }
}

/// Notify every observer that the cell's value *will* change (§4.4).
///
/// Exceptions — in Rust, panics — from one observer are isolated so a
/// faulty observer never prevents the others from being notified
/// (§7 "Observer-internal exception").
pub fn notify_will_update(core: &CellStateCore, cell: AnyCell<'_>) {
    assert!(!core.is_disposed(), "CellState used after disposal");

    core.notify_count.set(core.notify_count.get() + 1);
    debug_assert!(core.notify_count.get() > 0);

    let snapshot: SmallVec<[Rc<dyn Observer>; 4]> =
        core.observers.borrow().values().map(|(o, _)| o.clone()).collect();

    for observer in snapshot {
        if let Err(panic) =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer.will_update(cell)))
        {
            tracing::warn!(?panic, "observer panicked in will_update, isolated");
        }
    }
}

/// Notify every observer that the cell's value *has* changed (§4.4).
pub fn notify_update(core: &CellStateCore, cell: AnyCell<'_>, did_change: bool) {
    assert!(!core.is_disposed(), "CellState used after disposal");

    core.notify_count.set(core.notify_count.get() - 1);
    debug_assert!(core.notify_count.get() >= 0);

    let snapshot: SmallVec<[Rc<dyn Observer>; 4]> =
        core.observers.borrow().values().map(|(o, _)| o.clone()).collect();

    for observer in snapshot {
        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observer.update(cell, did_change)
        })) {
            tracing::warn!(?panic, "observer panicked in update, isolated");
        }
    }
}
