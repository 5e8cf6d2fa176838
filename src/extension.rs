//! Ergonomic `.peek()`/`.on_error()`/`.awaited()`/... methods on a cell
//! handle (§1 "Supplemented features").
//!
//! Grounded on `live_cells/extension.py`, which monkeypatches these same
//! names onto the base `Cell` class so any handle can call `.peek()`,
//! `.awaited()`, and so on directly instead of going through the
//! free-function form in `combinators`/`async_cell`. Rust has no
//! monkeypatching, so these are ordinary extension traits implemented for
//! the erased `dyn Cell<T>` handle every combinator already takes —
//! `cell.peek()` is exactly `peek(cell)`, just spelled as a method.
//!
//! These traits are implemented for `dyn Cell<T>` specifically, not
//! blanket over every `C: Cell<T>`: a generic `Rc<C> where C: Cell<T>`
//! impl would need to unsize `C` to `dyn Cell<T>` inside the method body
//! to call the underlying free functions, which is not expressible
//! without an unstable `Unsize` bound. Since every combinator already
//! takes `Rc<dyn Cell<T>>`, callers erase once (`Rc::new(x) as Rc<dyn
//! Cell<T>>`, the same cast used throughout this crate's own tests) and
//! the rest of the chain reads as plain method calls.

use std::fmt;
use std::rc::Rc;

use crate::async_cell::await_cell::{awaited, awaited_one, AwaitCell};
use crate::async_cell::wait_cell::{wait, wait_one, waited, waited_one};
use crate::async_cell::Awaitable;
use crate::cell::Cell;
use crate::combinators::{error, logand, logor, lognot, on_error, peek, select, PeekCell};
use crate::computed::DynamicComputeCell;
use crate::error::CellError;

/// `.peek()`, `.on_error()`, `.error()` — available on any cell.
pub trait CellExt<T>: Cell<T> {
    /// Read this cell's value without subscribing to its changes.
    fn peek(self: Rc<Self>) -> PeekCell<T>
    where
        T: Clone + 'static;

    /// Fall back to `other`'s value whenever this cell errors.
    fn on_error(
        self: Rc<Self>,
        other: Rc<dyn Cell<T>>,
        filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
    ) -> DynamicComputeCell<T>
    where
        T: Clone + PartialEq + fmt::Debug + 'static;

    /// Capture the last error raised while computing this cell's value.
    fn error(
        self: Rc<Self>,
        all: bool,
        filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
    ) -> DynamicComputeCell<Option<CellError>>
    where
        T: Clone + fmt::Debug + 'static;
}

impl<T: 'static> CellExt<T> for dyn Cell<T> {
    fn peek(self: Rc<Self>) -> PeekCell<T>
    where
        T: Clone + 'static,
    {
        peek(self)
    }

    fn on_error(
        self: Rc<Self>,
        other: Rc<dyn Cell<T>>,
        filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
    ) -> DynamicComputeCell<T>
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        on_error(self, other, filter)
    }

    fn error(
        self: Rc<Self>,
        all: bool,
        filter: Option<Rc<dyn Fn(&CellError) -> bool>>,
    ) -> DynamicComputeCell<Option<CellError>>
    where
        T: Clone + fmt::Debug + 'static,
    {
        error(self, all, filter)
    }
}

/// `.logand()`, `.logor()`, `.lognot()`, `.select()` — available on any
/// boolean-valued cell.
pub trait BoolCellExt: Cell<bool> {
    fn logand(self: Rc<Self>, other: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool>;
    fn logor(self: Rc<Self>, other: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool>;
    fn lognot(self: Rc<Self>) -> DynamicComputeCell<bool>;

    /// `if_true` when this cell is `true`; otherwise `if_false`, or the
    /// previously selected value if no `if_false` is given.
    fn select<U: Clone + PartialEq + fmt::Debug + 'static>(
        self: Rc<Self>,
        if_true: Rc<dyn Cell<U>>,
        if_false: Option<Rc<dyn Cell<U>>>,
    ) -> DynamicComputeCell<U>;
}

impl BoolCellExt for dyn Cell<bool> {
    fn logand(self: Rc<Self>, other: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool> {
        logand(self, other)
    }

    fn logor(self: Rc<Self>, other: Rc<dyn Cell<bool>>) -> DynamicComputeCell<bool> {
        logor(self, other)
    }

    fn lognot(self: Rc<Self>) -> DynamicComputeCell<bool> {
        lognot(self)
    }

    fn select<U: Clone + PartialEq + fmt::Debug + 'static>(
        self: Rc<Self>,
        if_true: Rc<dyn Cell<U>>,
        if_false: Option<Rc<dyn Cell<U>>>,
    ) -> DynamicComputeCell<U> {
        select(self, if_true, if_false)
    }
}

/// `.awaited()`, `.waited()`, `.wait()` — available on any cell whose
/// value is a deferred computation (§4.10, `waited.py`'s per-cell methods).
pub trait AwaitableCellExt<T>: Cell<Awaitable<T>> {
    /// Await this cell's (and, if given, `extra`'s) current awaitable,
    /// resetting to pending on every argument change (§6 `awaited`).
    fn awaited(self: Rc<Self>, extra: Vec<Rc<dyn Cell<Awaitable<T>>>>) -> AwaitCell<Vec<T>>
    where
        T: Clone + fmt::Debug + 'static;

    /// `awaited` with no extra cells, returning `T` rather than `Vec<T>`.
    fn awaited_one(self: Rc<Self>) -> AwaitCell<T>
    where
        T: Clone + fmt::Debug + 'static;

    /// Await this cell's (and, if given, `extra`'s) current awaitable (§6
    /// `waited(reset, queue)`).
    fn waited(
        self: Rc<Self>,
        extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
        reset: bool,
        queue: bool,
    ) -> Rc<dyn Cell<Vec<T>>>
    where
        T: Clone + fmt::Debug + 'static;

    /// `waited` with no extra cells, returning `T` rather than `Vec<T>`.
    fn waited_one(self: Rc<Self>, reset: bool, queue: bool) -> Rc<dyn Cell<T>>
    where
        T: Clone + fmt::Debug + 'static;

    /// `waited(...).call()` in one step (§6 `wait`).
    fn wait(
        self: Rc<Self>,
        extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
        reset: bool,
        queue: bool,
    ) -> Result<Vec<T>, CellError>
    where
        T: Clone + fmt::Debug + 'static;

    /// `waited_one(...).call()` in one step.
    fn wait_one(self: Rc<Self>, reset: bool, queue: bool) -> Result<T, CellError>
    where
        T: Clone + fmt::Debug + 'static;
}

impl<T: 'static> AwaitableCellExt<T> for dyn Cell<Awaitable<T>> {
    fn awaited(self: Rc<Self>, extra: Vec<Rc<dyn Cell<Awaitable<T>>>>) -> AwaitCell<Vec<T>>
    where
        T: Clone + fmt::Debug + 'static,
    {
        awaited(self, extra)
    }

    fn awaited_one(self: Rc<Self>) -> AwaitCell<T>
    where
        T: Clone + fmt::Debug + 'static,
    {
        awaited_one(self)
    }

    fn waited(
        self: Rc<Self>,
        extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
        reset: bool,
        queue: bool,
    ) -> Rc<dyn Cell<Vec<T>>>
    where
        T: Clone + fmt::Debug + 'static,
    {
        waited(self, extra, reset, queue)
    }

    fn waited_one(self: Rc<Self>, reset: bool, queue: bool) -> Rc<dyn Cell<T>>
    where
        T: Clone + fmt::Debug + 'static,
    {
        waited_one(self, reset, queue)
    }

    fn wait(
        self: Rc<Self>,
        extra: Vec<Rc<dyn Cell<Awaitable<T>>>>,
        reset: bool,
        queue: bool,
    ) -> Result<Vec<T>, CellError>
    where
        T: Clone + fmt::Debug + 'static,
    {
        wait(self, extra, reset, queue)
    }

    fn wait_one(self: Rc<Self>, reset: bool, queue: bool) -> Result<T, CellError>
    where
        T: Clone + fmt::Debug + 'static,
    {
        wait_one(self, reset, queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;

    #[test]
    fn peek_via_extension_method() {
        let a = Rc::new(mutable(1, None)) as Rc<dyn Cell<i32>>;
        let p = a.peek();
        assert_eq!(p.value().unwrap(), 1);
    }

    #[test]
    fn logand_via_extension_method() {
        let a = Rc::new(mutable(true, None)) as Rc<dyn Cell<bool>>;
        let b = Rc::new(mutable(false, None)) as Rc<dyn Cell<bool>>;
        let both = a.logand(b);
        assert_eq!(both.value().unwrap(), false);
    }

    #[test]
    fn wait_one_via_extension_method_before_any_observer() {
        let arg = Rc::new(mutable(Awaitable::new(async { Ok(1) }), None))
            as Rc<dyn Cell<Awaitable<i32>>>;
        // No tokio runtime in scope: the state (and its spawned task) is
        // only ever created once something observes the returned handle,
        // so merely building it and reading before that is safe and
        // reports "no active state" rather than "pending".
        let w = arg.waited_one(false, false);
        assert!(matches!(w.value(), Err(CellError::Uninitialized)));
    }
}
