//! Error types shared by every cell kind.
//!
//! Grounded on the corpus's general error-enum style (see
//! `venus-core/src/error.rs` in the example pack) rather than hand-rolled
//! `impl std::error::Error` blocks, since the teacher crate itself does not
//! define a typed error enum for its engine.

use std::fmt;
use std::rc::Rc;

/// Errors observable through [`crate::cell::Cell::value`].
///
/// `Compute` wraps an `Rc<dyn Error>` rather than owning the error directly
/// because a single failed computation must be replayable to every
/// downstream reader without re-running the computation (the Python
/// original gets this for free via reference semantics on the raised
/// exception object).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CellError {
    // PartialEq is implemented manually below since `Rc<dyn std::error::Error>`
    // has no derivable equality; `Compute` errors compare by pointer identity.
    /// The cell's compute function raised an error.
    #[error("cell computation failed: {0}")]
    Compute(Rc<dyn std::error::Error>),

    /// The value of a cell was referenced before it was initialized.
    #[error("the value of a cell was referenced before it was initialized")]
    Uninitialized,

    /// The value of an async cell was referenced before its task completed.
    #[error("the value of an async cell was referenced before the async task has completed")]
    PendingAsync,

    /// A keyed stateful cell was read without ever being observed.
    #[error("a keyed stateful cell's value was read without an active observer")]
    InactiveKeyedState,
}

impl CellError {
    /// Wrap an arbitrary error as a [`CellError::Compute`].
    pub fn compute<E: std::error::Error + 'static>(err: E) -> Self {
        CellError::Compute(Rc::new(err))
    }
}

impl PartialEq for CellError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellError::Compute(a), CellError::Compute(b)) => Rc::ptr_eq(a, b),
            (CellError::Uninitialized, CellError::Uninitialized) => true,
            (CellError::PendingAsync, CellError::PendingAsync) => true,
            (CellError::InactiveKeyedState, CellError::InactiveKeyedState) => true,
            _ => false,
        }
    }
}

/// Raised from inside a `computed` compute function via [`crate::computed::none`]
/// to signal "keep the previous value" (or an initial default on first compute).
///
/// This is control flow, not data: it never appears as a [`CellError`]
/// variant, matching the spec's error propagation policy that the
/// stop-compute signal is the only error unwound outside the compute
/// function by the engine itself.
#[derive(Debug, Clone)]
pub struct StopComputeException<T> {
    pub default_value: Option<T>,
}

impl<T> StopComputeException<T> {
    pub fn new(default_value: Option<T>) -> Self {
        Self { default_value }
    }
}

impl<T: fmt::Debug> fmt::Display for StopComputeException<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StopComputeException raised outside a cell value computation function"
        )
    }
}

/// A `Result` alias used inside `computed` compute closures, so `?` can
/// short-circuit either on a real error or on [`StopComputeException`].
pub type ComputeResult<T> = Result<T, ComputeOutcome<T>>;

/// Either a real, propagating error, or the stop-compute control signal.
#[derive(Debug, Clone)]
pub enum ComputeOutcome<T> {
    Stopped(StopComputeException<T>),
    Failed(CellError),
}

impl<T> From<CellError> for ComputeOutcome<T> {
    fn from(e: CellError) -> Self {
        ComputeOutcome::Failed(e)
    }
}
