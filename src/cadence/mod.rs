//! Scheduling cadence strategies.
//!
//! A [`Cadence`] decides **when** the driver loop may take its next step. Between
//! every two steps the loop hands a continuation to the cadence and suspends until the
//! cadence invokes it.
//!
//! ## Contents
//! - [`Immediate`] invokes the continuation synchronously
//! - [`Deferred`] fires after a (possibly jittered) timer, zero delay = next tick
//! - [`Idle`] fires after the runtime had a few chances to run other ready work
//! - [`All`] fires once every constituent cadence fired for the round
//! - [`JitterPolicy`] randomization applied by [`Deferred`]
//!
//! ## Contract
//! ```text
//! schedule(continuation) ──► CancelHandle
//!     continuation() runs exactly once, later (or inline for Immediate)
//!     handle.cancel() before that  ──► continuation never runs
//! ```

mod all;
mod deferred;
mod idle;
mod immediate;
mod jitter;

use std::fmt;

pub use all::All;
pub use deferred::Deferred;
pub use idle::Idle;
pub use immediate::Immediate;
pub use jitter::JitterPolicy;

/// Zero-argument continuation handed to a cadence.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Pluggable policy for when the loop may advance.
pub trait Cadence: Send + Sync + 'static {
    /// Arranges for `continuation` to run at a future scheduling opportunity.
    fn schedule(&self, continuation: Continuation) -> CancelHandle;
}

impl<C: Cadence + ?Sized> Cadence for std::sync::Arc<C> {
    fn schedule(&self, continuation: Continuation) -> CancelHandle {
        (**self).schedule(continuation)
    }
}

/// Cancels one scheduled continuation.
#[must_use = "dropping a CancelHandle does not cancel the continuation"]
pub struct CancelHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CancelHandle {
    /// Handle running `f` on cancellation.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(f)),
        }
    }

    /// Handle with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Cancels the continuation if it has not run yet.
    pub fn cancel(mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}
