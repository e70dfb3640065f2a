//! # Resumable computations.
//!
//! A [`Computation`] is an explicit state machine advanced one suspension step at a time.
//! The driver sends a [`Value`] in (the last resolved value) and gets a [`Step`] back:
//! either an intermediate produced value, or the final one.
//!
//! ```text
//! driver ── advance(input) ──► computation
//!        ◄── Step::Yield(v) ──            (v is normalized, fed back on the next advance)
//!        ◄── Step::Complete(v) ──         (task is done once v resolves)
//! ```
//!
//! Adapters:
//! - [`from_fn`] wraps a closure holding its own state;
//! - [`from_iter`] yields every item of an iterator, then completes with `null`;
//! - [`Serial`](crate::Serial) chains several computations into one.

use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::yielded::Yielded;

/// Outcome of one [`Computation::advance`] call.
#[derive(Debug)]
pub enum Step {
    /// Intermediate value; the computation expects to be advanced again.
    Yield(Yielded),
    /// Final value; the computation is finished.
    Complete(Yielded),
}

impl Step {
    /// Intermediate value shorthand.
    pub fn yield_value(v: impl Into<Yielded>) -> Self {
        Step::Yield(v.into())
    }

    /// Final value shorthand.
    pub fn complete(v: impl Into<Yielded>) -> Self {
        Step::Complete(v.into())
    }

    /// True for [`Step::Complete`].
    pub fn is_finished(&self) -> bool {
        matches!(self, Step::Complete(_))
    }

    /// Splits into the produced value and the finished flag.
    pub fn into_parts(self) -> (Yielded, bool) {
        match self {
            Step::Yield(v) => (v, false),
            Step::Complete(v) => (v, true),
        }
    }
}

/// # Resumable unit of stepwise work.
///
/// Implementations keep their own progress between calls. The driver never advances
/// a computation again once it returned [`Step::Complete`] or an error.
///
/// # Example
/// ```
/// use serde_json::{Value, json};
/// use taskdriver::{Computation, Step, TaskError};
///
/// struct Countdown(u32);
///
/// impl Computation for Countdown {
///     fn advance(&mut self, _input: Value) -> Result<Step, TaskError> {
///         if self.0 == 0 {
///             return Ok(Step::complete("liftoff"));
///         }
///         self.0 -= 1;
///         Ok(Step::yield_value(json!(self.0)))
///     }
/// }
/// ```
pub trait Computation: Send + 'static {
    /// Runs the computation up to its next suspension point.
    ///
    /// `input` is the resolved value of the previous step (`null` on the first call).
    /// Calling [`Task::terminate`](crate::Task::terminate) on the owning task from here
    /// is allowed; the unwind runs right after this call returns.
    fn advance(&mut self, input: Value) -> Result<Step, TaskError>;

    /// Unwinds the computation early and releases what it holds.
    ///
    /// Called at most once by [`Task::terminate`](crate::Task::terminate).
    fn terminate(&mut self) {}
}

impl Computation for Box<dyn Computation> {
    fn advance(&mut self, input: Value) -> Result<Step, TaskError> {
        (**self).advance(input)
    }

    fn terminate(&mut self) {
        (**self).terminate()
    }
}

/// Closure-backed computation, see [`from_fn`].
pub struct FnComputation<F> {
    f: F,
}

impl<F> Computation for FnComputation<F>
where
    F: FnMut(Value) -> Result<Step, TaskError> + Send + 'static,
{
    fn advance(&mut self, input: Value) -> Result<Step, TaskError> {
        (self.f)(input)
    }
}

/// Wraps a stateful closure as a computation.
///
/// # Example
/// ```
/// use serde_json::Value;
/// use taskdriver::{Step, Task, from_fn};
///
/// let mut left = 3;
/// let task = Task::new(from_fn(move |_input: Value| {
///     left -= 1;
///     Ok(if left == 0 { Step::complete("done") } else { Step::yield_value("tick") })
/// }));
/// assert_eq!(task.priority(), 0);
/// ```
pub fn from_fn<F>(f: F) -> FnComputation<F>
where
    F: FnMut(Value) -> Result<Step, TaskError> + Send + 'static,
{
    FnComputation { f }
}

/// Iterator-backed computation, see [`from_iter`].
pub struct IterComputation<I> {
    iter: Option<I>,
}

impl<I, Y> Computation for IterComputation<I>
where
    I: Iterator<Item = Y> + Send + 'static,
    Y: Into<Yielded>,
{
    fn advance(&mut self, _input: Value) -> Result<Step, TaskError> {
        match self.iter.as_mut().and_then(Iterator::next) {
            Some(item) => Ok(Step::Yield(item.into())),
            None => {
                self.iter = None;
                Ok(Step::Complete(Yielded::null()))
            }
        }
    }

    fn terminate(&mut self) {
        self.iter = None;
    }
}

/// Yields every item of `items` in turn, then completes with `null`.
///
/// The input sent back by the driver is ignored.
pub fn from_iter<T>(items: T) -> IterComputation<T::IntoIter>
where
    T: IntoIterator,
    T::IntoIter: Send + 'static,
    T::Item: Into<Yielded>,
{
    IterComputation {
        iter: Some(items.into_iter()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready(step: Step) -> (Value, bool) {
        let (y, done) = step.into_parts();
        match y {
            Yielded::Ready(v) => (v, done),
            other => panic!("expected ready value, got {other:?}"),
        }
    }

    #[test]
    fn iter_yields_then_completes() {
        let mut c = from_iter(["a", "b"]);
        assert_eq!(ready(c.advance(Value::Null).unwrap()), (json!("a"), false));
        assert_eq!(ready(c.advance(Value::Null).unwrap()), (json!("b"), false));
        assert_eq!(ready(c.advance(Value::Null).unwrap()), (Value::Null, true));
    }

    #[test]
    fn terminated_iter_completes_immediately() {
        let mut c = from_iter(vec![1i64, 2, 3]);
        c.terminate();
        assert_eq!(ready(c.advance(Value::Null).unwrap()), (Value::Null, true));
    }

    #[test]
    fn fn_computation_sees_inputs() {
        let mut seen = Vec::new();
        let mut c = from_fn(move |input: Value| {
            seen.push(input.clone());
            if seen.len() == 2 {
                Ok(Step::complete(json!(seen.clone())))
            } else {
                Ok(Step::yield_value("first"))
            }
        });
        assert_eq!(ready(c.advance(Value::Null).unwrap()), (json!("first"), false));
        assert_eq!(
            ready(c.advance(json!("first")).unwrap()),
            (json!([null, "first"]), true)
        );
    }
}
