//! Thin combinators atop [`Cell`]/[`crate::computed::computed`] (§1, §6).
//!
//! Grounded on `live_cells/peek_cell.py`, `error_handling.py` and
//! `boolean.py`. `logand`/`logor` go through the dynamic `computed()`
//! mechanism rather than a separate static-argument compute cell: the
//! original's `compute_cell.py` (a `ComputeCell` taking a fixed argument
//! set) is empty in the retrieved source, and two calls to `.call()`
//! inside a `computed` closure discover exactly the same two dependencies
//! a static argument set would have declared up front, so there is no
//! behavioural gap in folding these through the one mechanism (see
//! `DESIGN.md`).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cell::Cell;
use crate::computed::{computed, none, DynamicComputeCell};
use crate::error::{CellError, ComputeOutcome, ComputeResult};
use crate::key::{value_key, Key};
use crate::state::{AnyCell, Observable, Observer, ObserverId};

struct AndCellKeyKind;
struct OrCellKeyKind;
struct NotCellKeyKind;
struct OnErrorCellKeyKind;
struct ErrorCellKeyKind;

/// An observer wrapper that never forwards `will_update`/`update`, used by
/// [`PeekCell`] to stay registered with its wrapped cell (keeping any
/// shared keyed state alive) without reacting to its changes.
struct PeekCellObserver;

impl Observer for PeekCellObserver {
    fn will_update(&self, _cell: AnyCell<'_>) {}
    fn update(&self, _cell: AnyCell<'_>, _did_change: bool) {}
}

/// A stateless observable that exists only so `PeekCell::as_observable`
/// has something of its own identity to hand out — peek cells skip the
/// dependency tracker entirely (§6 "peek: read-without-subscribe"), so
/// nothing ever actually calls through this.
#[derive(Debug)]
struct PeekObservable;

impl Observable for PeekObservable {
    fn add_observer(self: Rc<Self>, _observer: Rc<dyn Observer>) {}
    fn remove_observer(self: Rc<Self>, _observer_id: ObserverId) {}
    fn observable_id(&self) -> usize {
        self as *const Self as usize
    }
}

/// A cell with the same value as `inner`, but whose own observers are
/// never notified of `inner`'s changes, and whose `.call()` never records
/// `inner` as a dependency of an enclosing computation (§6 `peek`).
///
/// Still worth calling `add_observer`/`remove_observer` on directly (not
/// just reading `.value()`) when you want `inner`'s keyed state kept alive
/// for as long as the peek handle is attached somewhere, without ever
/// reacting to it — the no-op wrapper observer registered with `inner`
/// accomplishes exactly that.
pub struct PeekCell<T> {
    inner: Rc<dyn Cell<T>>,
    wrappers: RefCell<FxHashMap<ObserverId, Rc<dyn Observer>>>,
}

impl<T> PeekCell<T> {
    pub fn new(inner: Rc<dyn Cell<T>>) -> Self {
        Self {
            inner,
            wrappers: RefCell::new(FxHashMap::default()),
        }
    }
}

impl<T: Clone + 'static> Cell<T> for PeekCell<T> {
    fn value(&self) -> Result<T, CellError> {
        self.inner.value()
    }

    /// Deliberately skips [`crate::tracker::track`]: reading a peeked cell
    /// never adds it as a dependency of the enclosing computation.
    fn call(&self) -> Result<T, CellError> {
        self.inner.value()
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        let id = ObserverId::of(&observer);
        let wrapper: Rc<dyn Observer> = Rc::new(PeekCellObserver);
        self.inner.add_observer(wrapper.clone());
        self.wrappers.borrow_mut().insert(id, wrapper);
    }

    fn remove_observer(&self, observer_id: ObserverId) {
        if let Some(wrapper) = self.wrappers.borrow_mut().remove(&observer_id) {
            self.inner.remove_observer(ObserverId::of(&wrapper));
        }
    }

    fn as_observable(&self) -> Rc<dyn Observable> {
        Rc::new(PeekObservable)
    }

    fn key(&self) -> Option<&Key> {
        None
    }
}

/// Read `cell`'s value without subscribing to its changes (§6 `peek`).
pub fn peek<T: Clone + 'static>(cell: Rc<dyn Cell<T>>) -> PeekCell<T> {
    PeekCell::new(cell)
}

/// A cell that evaluates to `other`'s value whenever `cell` errors (§6
/// `on_error(other, type=None)`). `filter`, if given, restricts the
/// fallback to errors it accepts — any other error still propagates
/// from the returned cell unchanged.
pub fn on_error<T: Clone + PartialEq + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<T>>,
    other: Rc<dyn Cell<T>>,
    filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
) -> DynamicComputeCell<T> {
    let key = value_key::<OnErrorCellKeyKind, _>((
        cell.as_observable().observable_id(),
        other.as_observable().observable_id(),
    ));

    computed(
        move || match cell.call() {
            Ok(v) => Ok(v),
            Err(e) => {
                if filter.as_ref().is_none_or(|f| f(&e)) {
                    Ok(other.call()?)
                } else {
                    Err(ComputeOutcome::Failed(e))
                }
            }
        },
        Some(key),
        false,
    )
}

/// A cell that captures the last error raised while computing `cell`'s
/// value (§6 `error(all=False, type=None)`).
///
/// Its own value is `None` until `cell` first errors; after that it holds
/// `Some(error)`. With `all = true`, it instead reports `None` explicitly
/// whenever `cell` computes successfully (rather than keeping the
/// previous captured error around). `filter`, if given, only captures
/// errors it accepts — others propagate from the returned cell unchanged.
pub fn error<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<T>>,
    all: bool,
    filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
) -> DynamicComputeCell<Option<CellError>> {
    let key = value_key::<ErrorCellKeyKind, _>((cell.as_observable().observable_id(), all));

    computed(
        move || -> ComputeResult<Option<CellError>> {
            match cell.call() {
                Ok(_) => {
                    if all {
                        Ok(None)
                    } else {
                        none(Some(None))
                    }
                }
                Err(e) => {
                    if filter.as_ref().is_none_or(|f| f(&e)) {
                        Ok(Some(e))
                    } else {
                        Err(ComputeOutcome::Failed(e))
                    }
                }
            }
        },
        Some(key),
        true,
    )
}

/// Logical AND of two boolean cells (§6 `logand`). Keyed, so repeat calls
/// with the same pair of cells share one underlying state.
pub fn logand(a: Rc<dyn Cell<bool>>, b: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool> {
    let key = value_key::<AndCellKeyKind, _>((
        a.as_observable().observable_id(),
        b.as_observable().observable_id(),
    ));
    computed(move || Ok(a.call()? && b.call()?), Some(key), false)
}

/// Logical OR of two boolean cells (§6 `logor`).
pub fn logor(a: Rc<dyn Cell<bool>>, b: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool> {
    let key = value_key::<OrCellKeyKind, _>((
        a.as_observable().observable_id(),
        b.as_observable().observable_id(),
    ));
    computed(move || Ok(a.call()? || b.call()?), Some(key), false)
}

/// Logical NOT of a boolean cell (§6 `lognot`).
pub fn lognot(a: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool> {
    let key = value_key::<NotCellKeyKind, _>(a.as_observable().observable_id());
    computed(move || Ok(!a.call()?), Some(key), false)
}

/// Select between two cells based on a boolean condition (§6
/// `select(if_true, if_false=None)`). With no `if_false`, the cell's
/// previous value is preserved while `cond` is false instead of switching
/// to anything (mirrors `none()`'s "keep previous value" semantics).
pub fn select<T: Clone + PartialEq + fmt::Debug + 'static>(
    cond: Rc<dyn Cell<bool>>,
    if_true: Rc<dyn Cell<T>>,
    if_false: Option<Rc<dyn Cell<T>>>,
) -> DynamicComputeCell<T> {
    computed(
        move || {
            if cond.call()? {
                Ok(if_true.call()?)
            } else {
                match &if_false {
                    Some(f) => Ok(f.call()?),
                    None => none(None),
                }
            }
        },
        None,
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;

    #[test]
    fn peek_does_not_propagate_changes() {
        let a = Rc::new(mutable(1, None));
        let p = peek(a.clone() as Rc<dyn Cell<i32>>);

        struct Recording(RefCell<u32>);
        impl Observer for Recording {
            fn will_update(&self, _: AnyCell<'_>) {}
            fn update(&self, _: AnyCell<'_>, _: bool) {
                *self.0.borrow_mut() += 1;
            }
        }
        let observer = Rc::new(Recording(RefCell::new(0)));
        p.add_observer(observer.clone());

        a.set(2).unwrap();
        assert_eq!(p.value().unwrap(), 2, "peek still reads the live value");
        assert_eq!(*observer.0.borrow(), 0, "but never notifies its own observers");
    }

    #[test]
    fn logand_tracks_both_operands() {
        let a = Rc::new(mutable(true, None));
        let b = Rc::new(mutable(false, None));
        let both = logand(a.clone() as Rc<dyn Cell<bool>>, b.clone() as Rc<dyn Cell<bool>>);

        assert_eq!(both.value().unwrap(), false);
        b.set(true).unwrap();
        assert_eq!(both.value().unwrap(), true);
    }

    #[test]
    fn select_without_else_keeps_previous_value() {
        let cond = Rc::new(mutable(true, None));
        let x = Rc::new(mutable(1, None));
        let s = Rc::new(select(
            cond.clone() as Rc<dyn Cell<bool>>,
            x.clone() as Rc<dyn Cell<i32>>,
            None,
        ));

        struct Noop;
        impl Observer for Noop {
            fn will_update(&self, _: AnyCell<'_>) {}
            fn update(&self, _: AnyCell<'_>, _: bool) {}
        }
        // A persisted, "keeps previous value" state only exists once
        // something actually observes the select cell.
        s.add_observer(Rc::new(Noop));

        assert_eq!(s.value().unwrap(), 1);
        cond.set(false).unwrap();
        assert_eq!(s.value().unwrap(), 1, "stays at the last selected value");
    }
}
