//! # Run policies: host veto over scheduling rounds.
//!
//! A [`RunPolicy`] is consulted by the loop before every selection:
//!
//! - [`RunPolicy::should_run`] gates the whole round (returning `false` makes it idle);
//! - [`RunPolicy::should_task_run`] filters individual candidates.
//!
//! Hooks run without any driver lock held, so they may call back into the driver
//! (for example to drop tasks).
//!
//! # Example
//! ```
//! use taskdriver::{RunPolicy, Task, from_iter};
//!
//! struct OnlyUrgent;
//!
//! impl RunPolicy for OnlyUrgent {
//!     fn should_task_run(&self, task: &Task) -> bool {
//!         task.priority() > 0
//!     }
//! }
//!
//! let low = Task::new(from_iter([1]));
//! assert!(!OnlyUrgent.should_task_run(&low));
//! assert!(OnlyUrgent.should_run());
//! ```

use crate::tasks::Task;

/// Host-supplied veto over scheduling decisions.
pub trait RunPolicy: Send + Sync + 'static {
    /// Whether the loop may select a task this round.
    fn should_run(&self) -> bool {
        true
    }

    /// Whether `task` may be selected this round.
    fn should_task_run(&self, task: &Task) -> bool {
        let _ = task;
        true
    }
}

/// Default policy: every round and every task is eligible.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunAll;

impl RunPolicy for RunAll {}

/// Policy built from a per-task predicate.
///
/// ```
/// use taskdriver::{RunPolicy, Task, TaskFilter, from_iter};
///
/// let policy = TaskFilter::new(|t: &Task| t.name() != "blocked");
/// assert!(!policy.should_task_run(&Task::named("blocked", from_iter([1]))));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TaskFilter<F> {
    filter: F,
}

impl<F> TaskFilter<F>
where
    F: Fn(&Task) -> bool + Send + Sync + 'static,
{
    /// Wraps a predicate.
    pub fn new(filter: F) -> Self {
        Self { filter }
    }
}

impl<F> RunPolicy for TaskFilter<F>
where
    F: Fn(&Task) -> bool + Send + Sync + 'static,
{
    fn should_task_run(&self, task: &Task) -> bool {
        (self.filter)(task)
    }
}
