//! `WaitCell` (§4.10, `live_cells/wait_cell.py`): the "preserve" async cell.
//!
//! Unlike [`super::await_cell::AwaitCell`], a new awaitable assigned to the
//! argument does not reset the visible value: the previous completed value
//! is kept until the new awaitable completes. `last_only` (the `queue`
//! keyword's negation in `waited()`) decides whether an outstanding wait is
//! cancelled in favour of the newest awaitable or left to finish, with
//! completions surfacing in assignment order.

use std::fmt;
use std::rc::Rc;

use super::{gathered, AsyncCellState, Awaitable, DownstreamPolicy};
use crate::cell::Cell;
use crate::error::CellError;
use crate::key::{value_key, Key};
use crate::state::{registry, Observable, Observer, ObserverId};

struct WaitedCellKeyKind;

/// A cell that awaits the argument's awaitable without resetting its
/// visible value on argument change (§4.10).
pub struct WaitCell<T> {
    key: Option<Key>,
    arg: Rc<dyn Cell<Awaitable<T>>>,
    last_only: bool,
    last_state: std::cell::RefCell<Option<Rc<AsyncCellState<T>>>>,
}

impl<T: Clone + fmt::Debug + 'static> WaitCell<T> {
    pub fn new(arg: Rc<dyn Cell<Awaitable<T>>>, last_only: bool, key: Option<Key>) -> Self {
        Self {
            key,
            arg,
            last_only,
            last_state: std::cell::RefCell::new(None),
        }
    }

    fn cached(&self) -> Option<Rc<AsyncCellState<T>>> {
        let last = self.last_state.borrow();
        match last.as_ref() {
            Some(s) if !crate::state::StatefulLifecycle::core(s.as_ref()).is_disposed() => {
                Some(s.clone())
            }
            _ => None,
        }
    }

    fn ensure_state(&self) -> Rc<AsyncCellState<T>> {
        if let Some(state) = self.cached() {
            return state;
        }

        let arg = self.arg.clone();
        let key = self.key.clone();
        let last_only = self.last_only;
        let state = registry::get(self.key.as_ref(), move || {
            AsyncCellState::new(key, arg, last_only, DownstreamPolicy::Suppress)
        });
        *self.last_state.borrow_mut() = Some(state.clone());
        state
    }

    fn maybe_state(&self) -> Option<Rc<AsyncCellState<T>>> {
        if let Some(state) = self.cached() {
            return Some(state);
        }
        let key = self.key.as_ref()?;
        let state = registry::maybe_get::<AsyncCellState<T>>(key)?;
        *self.last_state.borrow_mut() = Some(state.clone());
        Some(state)
    }
}

impl<T: Clone + fmt::Debug + 'static> Cell<T> for WaitCell<T> {
    fn value(&self) -> Result<T, CellError> {
        self.maybe_state()
            .ok_or(CellError::Uninitialized)?
            .value()
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        crate::state::add_observer(&self.ensure_state(), observer);
    }

    fn remove_observer(&self, observer_id: ObserverId) {
        if let Some(state) = self.maybe_state() {
            crate::state::remove_observer(&state, observer_id);
        }
    }

    fn as_observable(&self) -> Rc<dyn Observable> {
        self.ensure_state()
    }

    fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }
}

/// Create a `waited` cell over `cell` and, if given, `extra` (§6
/// `waited(*cells, reset=True, queue=False)`).
///
/// `reset = true` (the default) behaves exactly like [`super::await_cell::awaited`]
/// — returns a fresh, reset-on-change await cell. `reset = false` returns a
/// [`WaitCell`] instead: `queue = false` cancels the outstanding wait in
/// favour of the newest awaitable (only the latest completion is ever
/// observed); `queue = true` lets every awaitable run to completion and
/// surfaces them in assignment order.
pub fn waited<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<Awaitable<T>>>,
    extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
    reset: bool,
    queue: bool,
) -> Rc<dyn Cell<Vec<T>>> {
    let ids: Vec<usize> = std::iter::once(cell.as_observable().observable_id())
        .chain(extra.iter().map(|c| c.as_observable().observable_id()))
        .collect();
    let key = value_key::<WaitedCellKeyKind, _>((reset, queue, ids));
    let arg: Rc<dyn Cell<Awaitable<Vec<T>>>> = Rc::new(gathered(cell, extra, None));

    if reset {
        Rc::new(super::await_cell::AwaitCell::new(arg, Some(key)))
    } else {
        Rc::new(WaitCell::new(arg, !queue, Some(key)))
    }
}

/// `waited` for a single argument cell: the value stays `T`, not `Vec<T>`.
pub fn waited_one<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<Awaitable<T>>>,
    reset: bool,
    queue: bool,
) -> Rc<dyn Cell<T>> {
    let id = cell.as_observable().observable_id();
    let key = value_key::<WaitedCellKeyKind, _>((reset, queue, vec![id]));

    if reset {
        Rc::new(super::await_cell::AwaitCell::new(cell, Some(key)))
    } else {
        Rc::new(WaitCell::new(cell, !queue, Some(key)))
    }
}

/// `waited(...)` followed immediately by `.call()` (§6 `wait(*cells, ...)`).
pub fn wait<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<Awaitable<T>>>,
    extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
    reset: bool,
    queue: bool,
) -> Result<Vec<T>, CellError> {
    waited(cell, extra, reset, queue).call()
}

/// `wait` for a single argument cell (no gathering).
pub fn wait_one<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<Awaitable<T>>>,
    reset: bool,
    queue: bool,
) -> Result<T, CellError> {
    waited_one(cell, reset, queue).call()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;
    use std::time::Duration;

    struct Noop;
    impl Observer for Noop {
        fn will_update(&self, _: crate::state::AnyCell<'_>) {}
        fn update(&self, _: crate::state::AnyCell<'_>, _: bool) {}
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn last_only_suppresses_intermediate_completions() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let arg = Rc::new(mutable(
                    Awaitable::new(async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(1)
                    }),
                    None,
                ));

                let w = waited(arg.clone() as Rc<dyn Cell<Awaitable<i32>>>, vec![], false, false);
                w.add_observer(Rc::new(Noop));

                arg.set(Awaitable::new(async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(2)
                }))
                .unwrap();

                tokio::time::advance(Duration::from_secs(1)).await;
                tokio::task::yield_now().await;

                assert_eq!(w.value().unwrap(), vec![2]);
            })
            .await;
    }
}
