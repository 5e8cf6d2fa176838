//! The two-phase propagation barrier (§4.5 "ObserverCellState", the hard
//! part of the engine).
//!
//! Grounded line-for-line on `live_cells/observer_state.py`'s
//! `ObserverCellState.will_update`/`update`. Python expresses this as a
//! class a subclass inherits from and overrides four hook methods
//! (`pre_update`, `post_update`, `on_will_update`, `on_update`) plus a
//! `did_change` predicate. Rust has no mixin inheritance, so the barrier
//! here is two free functions, [`handle_will_update`] and
//! [`handle_update`], operating on a [`PropagationCore`] value plus a
//! [`PropagationHooks`] trait the owning state implements — composition
//! standing in for the Python mixin, per the Design Notes' "Polymorphic
//! cell set" steer.

use std::cell::Cell;

use crate::state::AnyCell;

/// `stale` / `updating` / in-flight dependency bookkeeping for a state that
/// is itself an [`crate::state::Observer`] of its dependencies (§4.5).
pub struct PropagationCore {
    pub stale: Cell<bool>,
    pub updating: Cell<bool>,
    changed_dependencies: Cell<u32>,
    did_change: Cell<bool>,
}

impl Default for PropagationCore {
    fn default() -> Self {
        Self {
            stale: Cell::new(true),
            updating: Cell::new(false),
            changed_dependencies: Cell::new(0),
            did_change: Cell::new(false),
        }
    }
}

impl PropagationCore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Hooks a concrete observing state implements to plug into the barrier.
///
/// Defaults forward straight to the cell's own observers, matching
/// `ObserverCellState`'s base `on_will_update`/`on_update` which just call
/// `notify_will_update`/`notify_update`.
pub trait PropagationHooks {
    fn propagation(&self) -> &PropagationCore;

    /// Called before the update cycle for this cell begins.
    fn pre_update(&self) {}

    /// Called after the update cycle for this cell has ended, only if
    /// the cycle produced a change.
    fn post_update(&self) {}

    /// Called once per cycle, after the first `will_update` is received.
    fn on_will_update(&self);

    /// Called once per cycle, when the last pending dependency `update`
    /// arrives.
    fn on_update(&self, did_change: bool);

    /// Did the cell's value actually change during this cycle? Overridden
    /// by the changes-only variant (§4.8) to compare old vs. new value.
    fn did_change(&self) -> bool {
        true
    }
}

/// Step 1/2 of §4.5: the first `will_update` in a cycle opens the barrier;
/// every subsequent one just increments the pending-dependency count.
pub fn handle_will_update<T: PropagationHooks>(this: &T, _cell: AnyCell<'_>) {
    let core = this.propagation();

    if !core.updating.get() {
        debug_assert_eq!(core.changed_dependencies.get(), 0);

        this.pre_update();

        core.updating.set(true);
        core.did_change.set(false);
        core.changed_dependencies.set(0);

        this.on_will_update();
        core.stale.set(true);
    }

    core.changed_dependencies.set(core.changed_dependencies.get() + 1);
}

/// Step 3 of §4.5: each dependency `update` closes one pending slot; when
/// the last one closes, the cycle's outcome is committed and forwarded.
pub fn handle_update<T: PropagationHooks>(this: &T, _cell: AnyCell<'_>, did_change: bool) {
    let core = this.propagation();

    if !core.updating.get() {
        return;
    }

    debug_assert!(core.changed_dependencies.get() > 0);
    core.changed_dependencies.set(core.changed_dependencies.get() - 1);
    core.did_change.set(core.did_change.get() || did_change);

    if core.changed_dependencies.get() == 0 {
        core.stale.set(core.stale.get() || core.did_change.get());

        let forwarded = core.did_change.get() && this.did_change();
        this.on_update(forwarded);
        core.updating.set(false);

        if core.did_change.get() {
            this.post_update();
        }
    }
}
