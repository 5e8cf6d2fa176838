//! The settable leaf cell (§4.7 "MutableCell + Batch").
//!
//! Grounded on `live_cells/mutable_cell.py`. `MutableCell` keeps two pieces
//! of the original's bookkeeping collapsed into one cached `Rc`: Python's
//! `StatefulCell._state` (the handle's fast-path cache) and `MutableCell.
//! _mutable_state` (used only to read the previous value when reseeding an
//! unkeyed cell) always point at the same object for a `MutableCell`, so
//! there is no need to track them separately here.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::batch::{self, BatchedState};
use crate::cell::Cell;
use crate::error::CellError;
use crate::key::Key;
use crate::state::{self, AnyCell, CellStateCore, Observable, Observer, ObserverId, StatefulLifecycle};

/// The shared, possibly key-shared backing store for one or more
/// [`MutableCell`] handles.
pub struct MutableCellState<T> {
    core: CellStateCore,
    value: RefCell<T>,
}

impl<T: Clone + PartialEq + 'static> MutableCellState<T> {
    fn new(key: Option<Key>, value: T) -> Rc<Self> {
        Rc::new(Self {
            core: CellStateCore::new(key),
            value: RefCell::new(value),
        })
    }

    pub fn get_value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Set the value, notifying observers unless a batch is open, in which
    /// case the `notify_update` is deferred to the batch's close (§4.7).
    ///
    /// Setting a disposed state's value writes through silently: it never
    /// notifies (there are no observers left to notify), but the write
    /// becomes the seed an unkeyed handle's *next* incarnation starts from
    /// (`MutableCell::create_fresh_state`).
    pub fn set_value(self: &Rc<Self>, new_value: T) {
        if self.core.is_disposed() {
            *self.value.borrow_mut() = new_value;
            return;
        }

        if *self.value.borrow() == new_value {
            return;
        }

        state::notify_will_update(&self.core, AnyCell(&self.core.key));
        *self.value.borrow_mut() = new_value;

        if batch::is_active() {
            let id = Rc::as_ptr(self) as *const () as usize;
            batch::enqueue(id, self.clone() as Rc<dyn BatchedState>);
        } else {
            state::notify_update(&self.core, AnyCell(&self.core.key), true);
        }
    }
}

impl<T: Clone + PartialEq + 'static> BatchedState for MutableCellState<T> {
    fn flush_update(&self) {
        state::notify_update(&self.core, AnyCell(&self.core.key), true);
    }
}

impl<T> StatefulLifecycle for MutableCellState<T> {
    fn core(&self) -> &CellStateCore {
        &self.core
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableCellState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableCellState")
            .field("key", &self.core.key)
            .field("value", &self.value.borrow())
            .finish()
    }
}

impl<T: fmt::Debug + 'static> Observable for MutableCellState<T> {
    fn add_observer(self: Rc<Self>, observer: Rc<dyn Observer>) {
        state::add_observer(&self, observer);
    }

    fn remove_observer(self: Rc<Self>, observer_id: ObserverId) {
        state::remove_observer(&self, observer_id);
    }

    fn observable_id(&self) -> usize {
        self as *const Self as usize
    }
}

/// A cell whose value is set directly rather than computed (§1, §4.7).
///
/// A keyed `MutableCell`'s state lives for as long as *any* handle sharing
/// its key has an observer; reading or writing its value before one is
/// ever attached fails with [`CellError::InactiveKeyedState`] (mirroring
/// `PersistentStatefulCell`'s guard in the original). An unkeyed cell has
/// no such restriction: its state is created lazily on first access and
/// re-created, seeded from its last known value, every time it drops back
/// to zero observers and is then touched again.
pub struct MutableCell<T> {
    key: Option<Key>,
    initial: T,
    last_state: RefCell<Option<Rc<MutableCellState<T>>>>,
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> MutableCell<T> {
    pub fn new(value: T, key: Option<Key>) -> Self {
        Self {
            key,
            initial: value,
            last_state: RefCell::new(None),
        }
    }

    /// The cached state if it is still live, without touching the registry.
    fn cached(&self) -> Option<Rc<MutableCellState<T>>> {
        let last = self.last_state.borrow();
        match last.as_ref() {
            Some(s) if !s.core.is_disposed() => Some(s.clone()),
            _ => None,
        }
    }

    fn create_fresh_state(&self) -> Rc<MutableCellState<T>> {
        let seed = if self.key.is_none() {
            match self.last_state.borrow().as_ref() {
                Some(old) => old.get_value(),
                None => self.initial.clone(),
            }
        } else {
            self.initial.clone()
        };

        MutableCellState::new(self.key.clone(), seed)
    }

    /// Retrieve the state, creating and registering it if necessary (§4.7
    /// `StatefulCell._ensure_state`, used unconditionally by `add_observer`).
    fn ensure_state(&self) -> Rc<MutableCellState<T>> {
        if let Some(state) = self.cached() {
            return state;
        }

        let state = crate::state::registry::get(self.key.as_ref(), || self.create_fresh_state());
        *self.last_state.borrow_mut() = Some(state.clone());
        state
    }

    /// Retrieve the state without creating it (`_get_state`), used by
    /// `remove_observer` which must never resurrect a disposed cell.
    fn maybe_state(&self) -> Option<Rc<MutableCellState<T>>> {
        if let Some(state) = self.cached() {
            return Some(state);
        }

        let key = self.key.as_ref()?;
        let state = crate::state::registry::maybe_get::<MutableCellState<T>>(key)?;
        *self.last_state.borrow_mut() = Some(state.clone());
        Some(state)
    }

    /// Retrieve the state for reading/writing `value` (`PersistentStatefulCell.state`):
    /// unkeyed cells always succeed (creating the state on demand); keyed
    /// cells fail if nobody currently observes that key.
    fn readable_state(&self) -> Result<Rc<MutableCellState<T>>, CellError> {
        if self.key.is_none() {
            Ok(self.ensure_state())
        } else {
            self.maybe_state().ok_or(CellError::InactiveKeyedState)
        }
    }

    /// Set the cell's value, notifying observers of the change (§4.7).
    /// A no-op, per §7's idempotence property, if the new value equals the
    /// current one.
    pub fn set(&self, value: T) -> Result<(), CellError> {
        self.readable_state()?.set_value(value);
        Ok(())
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Cell<T> for MutableCell<T> {
    fn value(&self) -> Result<T, CellError> {
        Ok(self.readable_state()?.get_value())
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        state::add_observer(&self.ensure_state(), observer);
    }

    fn remove_observer(&self, observer_id: ObserverId) {
        if let Some(state) = self.maybe_state() {
            state::remove_observer(&state, observer_id);
        }
    }

    fn as_observable(&self) -> Rc<dyn Observable> {
        self.ensure_state()
    }

    fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }
}

/// Create a mutable cell seeded with `value` (§6 `mutable(v, key=None)`).
pub fn mutable<T: Clone + PartialEq + fmt::Debug + 'static>(
    value: T,
    key: Option<Key>,
) -> MutableCell<T> {
    MutableCell::new(value, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::value_key;
    use std::cell::Cell as StdCell;

    struct RecordingObserver {
        count: StdCell<u32>,
    }

    impl Observer for RecordingObserver {
        fn will_update(&self, _cell: AnyCell<'_>) {}
        fn update(&self, _cell: AnyCell<'_>, _did_change: bool) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn set_equal_value_does_not_notify() {
        let m = mutable(1, None);
        let observer = Rc::new(RecordingObserver {
            count: StdCell::new(0),
        });
        m.add_observer(observer.clone());

        m.set(1).unwrap();
        assert_eq!(observer.count.get(), 0);

        m.set(2).unwrap();
        assert_eq!(observer.count.get(), 1);
    }

    #[test]
    fn batch_coalesces_updates() {
        let a = mutable(0, None);
        let observer = Rc::new(RecordingObserver {
            count: StdCell::new(0),
        });
        a.add_observer(observer.clone());

        {
            let _b = batch::batch();
            a.set(1).unwrap();
            a.set(2).unwrap();
        }

        assert_eq!(observer.count.get(), 1);
        assert_eq!(a.value().unwrap(), 2);
    }

    #[test]
    fn nested_batch_flushes_once_at_outermost_exit() {
        let a = mutable(0, None);
        let observer = Rc::new(RecordingObserver {
            count: StdCell::new(0),
        });
        a.add_observer(observer.clone());

        {
            let _outer = batch::batch();
            {
                let _inner = batch::batch();
                a.set(1).unwrap();
            }
            assert_eq!(observer.count.get(), 0, "inner guard must not flush");
        }

        assert_eq!(observer.count.get(), 1);
    }

    #[test]
    fn keyed_state_reseeds_from_construction_value() {
        struct TestKey;
        let key = value_key::<TestKey, _>(("shared",));

        let m1 = mutable(0, Some(key.clone()));
        let observer = Rc::new(RecordingObserver {
            count: StdCell::new(0),
        });
        m1.add_observer(observer.clone());

        let m2 = mutable(0, Some(key.clone()));
        m2.set(5).unwrap();
        assert_eq!(m1.value().unwrap(), 5);

        m1.remove_observer(ObserverId::of(&(observer.clone() as Rc<dyn Observer>)));

        let m3 = mutable(0, Some(key));
        assert!(m3.value().is_err(), "no observer yet, key is inactive");
        m3.add_observer(observer);
        assert_eq!(m3.value().unwrap(), 0, "reseeds from the construction value");
    }

    #[test]
    fn unkeyed_state_reseeds_from_last_value() {
        let m = mutable(0, None);
        let observer = Rc::new(RecordingObserver {
            count: StdCell::new(0),
        });
        m.add_observer(observer.clone());
        m.set(7).unwrap();

        m.remove_observer(ObserverId::of(&(observer as Rc<dyn Observer>)));
        assert_eq!(
            m.value().unwrap(),
            7,
            "unkeyed handle preserves its last value across state recreation"
        );
    }
}
