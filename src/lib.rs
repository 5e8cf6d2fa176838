//! A reactive-programming library built around the *cell*: a value-bearing
//! node in a dynamic dependency graph that recomputes derived values and
//! notifies observers whenever upstream inputs change.
//!
//! The hard engineering lives in the propagation engine (§4.5
//! [`state::propagation`]): a two-phase notification protocol that
//! preserves glitch-freedom (no observer ever sees an inconsistent
//! combination of upstream values), dynamic dependency tracking (a
//! computed cell may depend on different inputs each time it runs), keyed
//! state sharing with reference-counted lifecycle, atomic batched updates,
//! and integration with cooperative asynchronous tasks for awaited values.
//!
//! # Threading model
//!
//! This crate is explicitly single-threaded and cooperative. Every state
//! object is `Rc`/`RefCell`-based, which makes the crate's cell types
//! `!Send` and `!Sync` by construction — the compiler, not a runtime
//! check, is what confines an engine to one OS thread. Async cells
//! (`await`/`wait`, [`async_cell`]) integrate with this by spawning onto
//! a `tokio::task::LocalSet` via `tokio::task::spawn_local`, never
//! `tokio::spawn`: the only place control may yield is inside that
//! spawned task's own `.await`s, never inside `will_update`/`update`,
//! `value`, or a batch body.
//!
//! # Modules
//!
//! - [`error`] — [`error::CellError`], [`error::StopComputeException`].
//! - [`maybe`] — the async value/error/pending tri-state.
//! - [`key`] — opaque, type-erased cell keys for state sharing.
//! - [`tracker`] — the ambient dependency-recording context.
//! - [`state`] — the observer protocol, propagation barrier, and registry.
//! - [`cell`] — the [`cell::Cell`] trait and [`cell::constant::ConstantCell`].
//! - [`mutable`] — the settable leaf cell and [`batch`].
//! - [`computed`] — the dynamic computed cell.
//! - [`watch`] — eager watch functions.
//! - [`async_cell`] — `await`/`wait` cells over cooperative async tasks.
//! - [`combinators`] — `peek`, `on_error`, `error`, `logand`/`logor`/`lognot`, `select`.
//! - [`extension`] — the same combinators as `.method()` calls on `dyn Cell`.

pub mod async_cell;
pub mod batch;
pub mod cell;
pub mod combinators;
pub mod computed;
pub mod error;
pub mod extension;
pub mod key;
pub mod maybe;
pub mod mutable;
pub mod state;
#[cfg(test)]
mod test_support;
pub mod tracker;
pub mod watch;

pub use async_cell::await_cell::{awaited, awaited_one, AwaitCell};
pub use async_cell::wait_cell::{wait, wait_one, waited, waited_one, WaitCell};
pub use async_cell::Awaitable;
pub use batch::{batch, batched, BatchGuard};
pub use cell::constant::{value, ConstantCell};
pub use cell::Cell;
pub use combinators::{error, logand, logor, lognot, on_error, peek, select, PeekCell};
pub use computed::{computed, none, ComputeFn, DynamicComputeCell};
pub use error::{CellError, ComputeOutcome, ComputeResult, StopComputeException};
pub use extension::{AwaitableCellExt, BoolCellExt, CellExt};
pub use key::{value_key, Key};
pub use maybe::Maybe;
pub use mutable::{mutable, MutableCell};
pub use watch::{watch, CellWatcher, Scheduler};
