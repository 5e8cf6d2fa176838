//! [`Maybe`] — the value/error/pending tri-state used to carry async
//! computation outcomes.
//!
//! The Design Notes call this out explicitly ("Maybe as tagged sum"): the
//! pending/value/error tri-state is better expressed as a three-way sum
//! than as two nullable fields, which is exactly what this enum is.

use crate::error::CellError;

/// The outcome of a cell computation: a value, a captured error, or — for
/// async cells only — "not completed yet".
#[derive(Debug, Clone)]
pub enum Maybe<T> {
    Value(T),
    Error(CellError),
    Pending,
}

impl<T> Maybe<T> {
    /// Run `compute` and wrap its outcome.
    pub fn wrap(compute: impl FnOnce() -> Result<T, CellError>) -> Self {
        match compute() {
            Ok(v) => Maybe::Value(v),
            Err(e) => Maybe::Error(e),
        }
    }

    /// Return the value or raise the captured error/pending state.
    pub fn unwrap(self) -> Result<T, CellError> {
        match self {
            Maybe::Value(v) => Ok(v),
            Maybe::Error(e) => Err(e),
            Maybe::Pending => Err(CellError::PendingAsync),
        }
    }

    pub fn as_ref(&self) -> Maybe<&T> {
        match self {
            Maybe::Value(v) => Maybe::Value(v),
            Maybe::Error(e) => Maybe::Error(e.clone()),
            Maybe::Pending => Maybe::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Maybe::Pending)
    }
}

impl<T: PartialEq> PartialEq for Maybe<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Maybe::Value(a), Maybe::Value(b)) => a == b,
            (Maybe::Pending, Maybe::Pending) => true,
            // Errors are never considered equal to each other; a fresh
            // error is always a change (mirrors ChangesOnlyState's
            // `except: return True` fallback in changes_only_state.py).
            _ => false,
        }
    }
}
