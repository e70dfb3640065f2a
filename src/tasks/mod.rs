//! # Task abstractions.
//!
//! This module provides the core task-related types:
//! - [`Computation`] - trait for resumable, stepwise computations
//! - [`Step`] - outcome of one step (intermediate or final value)
//! - [`Yielded`] - produced value: concrete, asynchronous, or a collection of both
//! - [`Task`] - shared handle bundling a computation with scheduling metadata
//! - [`Serial`] - runs several computations one after another as one task

mod computation;
mod serial;
mod task;
mod yielded;

pub use computation::{Computation, FnComputation, IterComputation, Step, from_fn, from_iter};
pub use serial::Serial;
pub use task::{Task, TaskBuilder, TaskStage};
pub use yielded::{Yielded, measure, normalize};
