//! The two async seed scenarios from §8 that no module-level test exercises
//! end to end: reset-vs-preserve on argument change (item 4), and wait
//! queue ordering under synchronous reassignment (item 5).

use std::rc::Rc;
use std::time::Duration;

use reactive_cells::state::{AnyCell, Observer};
use reactive_cells::{awaited_one, mutable, waited_one, Awaitable, Cell, CellError};

struct Noop;
impl Observer for Noop {
    fn will_update(&self, _: AnyCell<'_>) {}
    fn update(&self, _: AnyCell<'_>, _: bool) {}
}

/// §8 item 4: `w1 = arg.awaited()` resets to pending on every argument
/// change; `w2 = arg.waited(reset=False)` keeps the last completed value
/// until the new awaitable finishes.
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn await_reset_vs_wait_preserve() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let arg = Rc::new(mutable(
                Awaitable::new(async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(1)
                }),
                None,
            ));

            let w1 = awaited_one(arg.clone() as Rc<dyn Cell<Awaitable<i32>>>);
            let w2 = waited_one(arg.clone() as Rc<dyn Cell<Awaitable<i32>>>, false, false);
            w1.add_observer(Rc::new(Noop));
            w2.add_observer(Rc::new(Noop));

            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert_eq!(w1.value().unwrap(), 1);
            assert_eq!(w2.value().unwrap(), 1);

            arg.set(Awaitable::new(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(2)
            }))
            .unwrap();

            assert!(matches!(w1.value(), Err(CellError::PendingAsync)));
            assert_eq!(w2.value().unwrap(), 1, "preserves the last completed value");

            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert_eq!(w1.value().unwrap(), 2);
            assert_eq!(w2.value().unwrap(), 2);
        })
        .await;
}

/// §8 item 5: four synchronous reassignments of the argument, with delays
/// of 5s/immediate/30s/immediate. `queue = true` serializes every
/// completion in assignment order; `queue = false` cancels every
/// outstanding wait in favour of the newest awaitable.
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn wait_queue_ordering() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let f = Rc::new(mutable(
                Awaitable::new(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                }),
                None,
            ));

            let queued = waited_one(f.clone() as Rc<dyn Cell<Awaitable<i32>>>, false, true);
            queued.add_observer(Rc::new(Noop));

            f.set(Awaitable::new(async { Ok(2) })).unwrap();
            f.set(Awaitable::new(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(3)
            }))
            .unwrap();
            f.set(Awaitable::new(async { Ok(4) })).unwrap();

            // Nothing can resolve before the 5s task at the head of the
            // chain does; the three chained followers all sit behind it.
            assert!(matches!(queued.value(), Err(CellError::PendingAsync)));

            tokio::time::advance(Duration::from_secs(5)).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            assert_eq!(
                queued.value().unwrap(),
                2,
                "the 5s task's followers with no timer of their own (2) drain in the same tick"
            );

            tokio::time::advance(Duration::from_secs(30)).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            assert_eq!(queued.value().unwrap(), 4, "chain drains to the last assigned value");
        })
        .await;
}

/// Same four reassignments, but `queue = false`: every outstanding wait is
/// cancelled in favour of the newest awaitable, so only its completion is
/// ever observed.
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn wait_cancel_ordering() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let f = Rc::new(mutable(
                Awaitable::new(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                }),
                None,
            ));

            let cancelling = waited_one(f.clone() as Rc<dyn Cell<Awaitable<i32>>>, false, false);
            cancelling.add_observer(Rc::new(Noop));

            f.set(Awaitable::new(async { Ok(2) })).unwrap();
            f.set(Awaitable::new(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(3)
            }))
            .unwrap();
            f.set(Awaitable::new(async { Ok(4) })).unwrap();

            tokio::time::advance(Duration::from_secs(30)).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }

            assert_eq!(cancelling.value().unwrap(), 4, "only the newest awaitable's completion is ever observed");
        })
        .await;
}
