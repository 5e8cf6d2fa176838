//! The [`Cell`] contract (§4.1) and the constant cell (§1, out-of-scope
//! wrapper list notwithstanding — `ConstantCell` is load-bearing enough to
//! live in core, see `live_cells/constant_cell.py`).

pub mod constant;

use std::rc::Rc;

use crate::error::CellError;
use crate::key::Key;
use crate::state::{Observable, Observer, ObserverId};
use crate::tracker;

/// A reactive value handle (§4.1).
///
/// Object-safe by construction (every method takes `&self`, none are
/// generic, none return `Self`) so combinators can hold
/// `Rc<dyn Cell<T>>` when they need to erase *which* concrete cell kind
/// produces a `T`, while still being usable as a plain generic bound
/// (`impl Cell<T>`) everywhere a concrete type is known at compile time —
/// which is the common case, since compute closures simply capture
/// concrete handles the way the Python original captures plain variables.
pub trait Cell<T> {
    /// The current value, or the captured error. For unobserved computed
    /// cells this runs the compute function ad hoc; for observed cells it
    /// returns the cached value, recomputing first if stale.
    fn value(&self) -> Result<T, CellError>;

    /// Returns the value and, if an [`crate::tracker`] scope is active,
    /// records this cell as a dependency of the enclosing computation
    /// (§4.1, §4.2).
    fn call(&self) -> Result<T, CellError> {
        tracker::track(self.as_observable());
        self.value()
    }

    fn add_observer(&self, observer: Rc<dyn Observer>);
    fn remove_observer(&self, observer_id: ObserverId);

    /// A type-erased view of this cell usable purely for observer
    /// registration, independent of `T` — what the argument tracker needs.
    fn as_observable(&self) -> Rc<dyn Observable>;

    /// The cell's key, if any (§3 "Key").
    fn key(&self) -> Option<&Key>;
}
