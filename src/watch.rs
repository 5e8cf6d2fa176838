//! Eager watch functions (§4.9 "Watcher").
//!
//! Grounded on `live_cells/watch.py`. `CellWatchObserver` reuses neither
//! `CellStateCore` nor [`crate::state::propagation`]'s barrier: a watcher
//! has no downstream observers of its own, so the spec trims the barrier
//! down to just the `updating`/`waiting_for_change` pair, as the original
//! does by hand-rolling `will_update`/`update` rather than going through
//! `ObserverCellState`.
//!
//! One deliberate simplification versus the original: when a `schedule`
//! function is supplied, `live_cells/watch.py` replays the callback against
//! a `Maybe`-snapshot of each already-known argument's value captured at
//! the moment the call was scheduled, so a deferred run observes values
//! consistent with the triggering update even if further mutations happen
//! before the scheduler gets around to invoking it. Reproducing that here
//! would mean threading a value-override channel through every cell's
//! `call()`, not just the watcher's own tracker callback. Since a `schedule`
//! function, in practice, defers to "next microtask/frame" with no
//! intervening mutation expected, this re-reads the arguments' live values
//! when the scheduled callback actually runs instead — see `DESIGN.md`.

use std::cell::Cell as StdCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::ComputeOutcome;
use crate::error::ComputeResult;
use crate::state::{AnyCell, Observable, Observer, ObserverId};
use crate::tracker::{self, Tracker};

/// A function that schedules `callback` to run later, rather than
/// immediately (§4.9 "optionally via a user-supplied scheduler").
pub type Scheduler = Rc<dyn Fn(Rc<dyn Fn()>)>;

struct CellWatchObserver {
    callback: Rc<dyn Fn() -> ComputeResult<()>>,
    schedule: Option<Scheduler>,
    self_weak: Weak<CellWatchObserver>,
    arguments: std::cell::RefCell<FxHashMap<usize, Rc<dyn Observable>>>,
    updating: StdCell<bool>,
    waiting_for_change: StdCell<bool>,
    stopped: StdCell<bool>,
}

impl CellWatchObserver {
    fn start(callback: Rc<dyn Fn() -> ComputeResult<()>>, schedule: Option<Scheduler>) -> Rc<Self> {
        let this = Rc::new_cyclic(|weak| Self {
            callback,
            schedule,
            self_weak: weak.clone(),
            arguments: std::cell::RefCell::new(FxHashMap::default()),
            updating: StdCell::new(false),
            waiting_for_change: StdCell::new(false),
            stopped: StdCell::new(false),
        });
        this.call_watch();
        this
    }

    fn track_argument(self: &Rc<Self>, arg: Rc<dyn Observable>) {
        let id = arg.observable_id();

        if self.arguments.borrow().contains_key(&id) {
            return;
        }

        let observer: Rc<dyn Observer> = self.clone();
        arg.clone().add_observer(observer);
        self.arguments.borrow_mut().insert(id, arg);
    }

    fn call_watch(self: &Rc<Self>) {
        if self.stopped.get() {
            return;
        }

        match &self.schedule {
            Some(schedule) => {
                let this = self.clone();
                let callback: Rc<dyn Fn()> = Rc::new(move || this.call_watch_tracked());
                schedule(callback);
            }
            None => self.call_watch_tracked(),
        }
    }

    fn call_watch_tracked(self: &Rc<Self>) {
        let this = self.clone();
        let tracker: Tracker = Rc::new(move |arg| this.track_argument(arg));
        let _guard = tracker::push(tracker);
        self.call_callback();
    }

    fn call_callback(&self) {
        match (self.callback)() {
            Ok(()) => {}
            Err(ComputeOutcome::Stopped(_)) => {}
            Err(ComputeOutcome::Failed(e)) => {
                tracing::debug!(error = %e, "unhandled error in watch function");
            }
        }
    }

    fn stop(&self) {
        if self.stopped.get() {
            return;
        }
        self.stopped.set(true);

        if let Some(strong) = self.self_weak.upgrade() {
            let observer: Rc<dyn Observer> = strong;
            let id = ObserverId::of(&observer);
            for (_, arg) in self.arguments.borrow_mut().drain() {
                arg.remove_observer(id);
            }
        }
    }
}

impl fmt::Debug for CellWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellWatchObserver")
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

impl Observer for CellWatchObserver {
    fn will_update(&self, _cell: AnyCell<'_>) {
        if !self.updating.get() {
            self.updating.set(true);
            self.waiting_for_change.set(false);
        }
    }

    fn update(&self, _cell: AnyCell<'_>, did_change: bool) {
        if self.updating.get() || (did_change && self.waiting_for_change.get()) {
            self.updating.set(false);
            self.waiting_for_change.set(!did_change);

            if did_change {
                if let Some(this) = self.self_weak.upgrade() {
                    this.call_watch();
                }
            }
        }
    }
}

/// A handle to a running watch function (§4.9).
///
/// Created by [`watch`]. The callback runs once immediately, registering
/// every cell it reads via `.call()` as a dependency; it re-runs each time
/// at least one dependency actually changes, until [`CellWatcher::stop`] is
/// called.
pub struct CellWatcher {
    observer: Rc<CellWatchObserver>,
}

impl CellWatcher {
    /// Stop the watch function from running again. Idempotent.
    pub fn stop(&self) {
        self.observer.stop();
    }

    /// Re-arm a stopped watcher: runs the callback immediately and resumes
    /// tracking its dependencies, as though it had just been created.
    pub fn restart(&self) {
        self.observer.stopped.set(false);
        self.observer.call_watch();
    }
}

/// Register `callback` to run once immediately and again on every change
/// to the cells it reads via `.call()` (§6 `watch(callback, schedule=None)`).
///
/// `schedule`, if given, receives a thunk to run instead of `callback`
/// being invoked directly — use it to defer/coalesce watch runs onto
/// another execution context (a UI frame callback, a task queue, ...).
pub fn watch(
    callback: impl Fn() -> ComputeResult<()> + 'static,
    schedule: Option<Scheduler>,
) -> CellWatcher {
    CellWatcher {
        observer: CellWatchObserver::start(Rc::new(callback), schedule),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::computed::{computed, none};
    use crate::mutable::mutable;

    #[test]
    fn watch_runs_immediately_and_on_change() {
        let a = Rc::new(mutable(1, None));
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));

        let (a2, seen2) = (a.clone(), seen.clone());
        let w = watch(
            move || {
                seen2.borrow_mut().push(a2.call()?);
                Ok(())
            },
            None,
        );

        assert_eq!(*seen.borrow(), vec![1]);

        a.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2]);

        w.stop();
        a.set(3).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2], "no further runs after stop()");
    }

    #[test]
    fn none_inside_watch_skips_the_run_silently() {
        let a = Rc::new(mutable(1, None));
        let runs = Rc::new(StdCell::new(0));

        let (a2, runs2) = (a.clone(), runs.clone());
        let _w = watch(
            move || {
                runs2.set(runs2.get() + 1);
                if a2.call()? == 2 {
                    return none(None);
                }
                Ok(())
            },
            None,
        );

        assert_eq!(runs.get(), 1);
        a.set(2).unwrap();
        assert_eq!(runs.get(), 2, "still re-invoked; none() just discards this run's effects");
    }

    #[test]
    fn dependent_on_computed_cell() {
        let a = Rc::new(mutable(1, None));
        let a2 = a.clone();
        let squared = Rc::new(computed(move || Ok(a2.call()? * a2.call()?), None, false));

        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let (squared2, seen2) = (squared.clone(), seen.clone());
        let _w = watch(
            move || {
                seen2.borrow_mut().push(squared2.call()?);
                Ok(())
            },
            None,
        );

        assert_eq!(*seen.borrow(), vec![1]);
        a.set(3).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 9]);
    }
}
