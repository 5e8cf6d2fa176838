//! `AwaitCell` (§4.10, `live_cells/await_cell.py`): the "reset" async cell.
//!
//! On every change to the argument's awaitable, the visible value is reset
//! to pending and only the newest awaitable is waited for — any wait for
//! an older awaitable is cancelled.

use std::fmt;
use std::rc::Rc;

use super::{gathered, AsyncCellState, Awaitable, DownstreamPolicy};
use crate::cell::Cell;
use crate::error::CellError;
use crate::key::{value_key, Key};
use crate::state::{registry, Observable, Observer, ObserverId};

/// Marker kind for keys minted by [`awaited`].
struct AwaitCellKeyKind;

/// A cell whose value is the completed value of the awaitable held by its
/// argument cell (§4.10).
///
/// Reading the value before the current awaitable has completed returns
/// [`CellError::PendingAsync`]. Assigning a new awaitable to the argument
/// resets the visible value to pending and cancels the wait for any
/// awaitable still outstanding.
pub struct AwaitCell<T> {
    key: Option<Key>,
    arg: Rc<dyn Cell<Awaitable<T>>>,
    last_state: std::cell::RefCell<Option<Rc<AsyncCellState<T>>>>,
}

impl<T: Clone + fmt::Debug + 'static> AwaitCell<T> {
    pub fn new(arg: Rc<dyn Cell<Awaitable<T>>>, key: Option<Key>) -> Self {
        Self {
            key,
            arg,
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
        let state = registry::get(self.key.as_ref(), move || {
            AsyncCellState::new(key, arg, true, DownstreamPolicy::Reset)
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

impl<T: Clone + fmt::Debug + 'static> Cell<T> for AwaitCell<T> {
    fn value(&self) -> Result<T, CellError> {
        self.maybe_state()
            .ok_or(CellError::Uninitialized)?
            .value()
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        state_add_observer(&self.ensure_state(), observer);
    }

    fn remove_observer(&self, observer_id: ObserverId) {
        if let Some(state) = self.maybe_state() {
            state_remove_observer(&state, observer_id);
        }
    }

    fn as_observable(&self) -> Rc<dyn Observable> {
        self.ensure_state()
    }

    fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }
}

fn state_add_observer<T: Clone + fmt::Debug + 'static>(
    state: &Rc<AsyncCellState<T>>,
    observer: Rc<dyn Observer>,
) {
    crate::state::add_observer(state, observer);
}

fn state_remove_observer<T: Clone + fmt::Debug + 'static>(
    state: &Rc<AsyncCellState<T>>,
    observer_id: ObserverId,
) {
    crate::state::remove_observer(state, observer_id);
}

/// Await the coroutine/future held by `cell`, and, if given, by each of
/// `extra` (§6 `awaited(*cells)`). With extra cells, the result is a
/// `Vec<T>` in argument order, recomputed once both the originating
/// cell's and the extra cells' wait cycles settle together rather than
/// once per cell.
pub fn awaited<T: Clone + fmt::Debug + 'static>(
    cell: Rc<dyn Cell<Awaitable<T>>>,
    extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
) -> AwaitCell<Vec<T>> {
    let ids: Vec<usize> = std::iter::once(cell.as_observable().observable_id())
        .chain(extra.iter().map(|c| c.as_observable().observable_id()))
        .collect();
    let key = value_key::<AwaitCellKeyKind, _>(ids);

    let gathered_cell = Rc::new(gathered(cell, extra, None));
    AwaitCell::new(gathered_cell, Some(key))
}

/// `awaited` for a single argument cell, with no extra cells to gather.
pub fn awaited_one<T: Clone + fmt::Debug + 'static>(cell: Rc<dyn Cell<Awaitable<T>>>) -> AwaitCell<T> {
    let id = cell.as_observable().observable_id();
    let key = value_key::<AwaitCellKeyKind, _>(vec![id]);
    AwaitCell::new(cell, Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;
    use crate::test_support::virtual_time;
    use std::time::Duration;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn resolves_after_completion() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let arg = Rc::new(mutable(
                    Awaitable::new(async {
                        virtual_time::sleep(Duration::from_secs(1)).await;
                        Ok(1)
                    }),
                    None,
                ));

                let w = awaited_one(arg.clone());
                struct Noop;
                impl Observer for Noop {
                    fn will_update(&self, _: crate::state::AnyCell<'_>) {}
                    fn update(&self, _: crate::state::AnyCell<'_>, _: bool) {}
                }
                w.add_observer(Rc::new(Noop));

                assert!(matches!(w.value(), Err(CellError::PendingAsync)));

                virtual_time::advance(Duration::from_secs(1)).await;
                tokio::task::yield_now().await;

                assert_eq!(w.value().unwrap(), 1);
            })
            .await;
    }
}
