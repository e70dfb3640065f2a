//! Candidate ordering.
//!
//! Higher `priority` wins, then higher `minor_priority`, then the smaller accumulated
//! runtime. Remaining ties keep pool (insertion) order. Keys are read at call time,
//! so priority changes and runtime growth apply on the very next round.

use std::cmp::{Ordering, Reverse};
use std::time::Duration;

use crate::tasks::Task;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    priority: i64,
    minor: i64,
    runtime: Reverse<Duration>,
}

impl Rank {
    fn of(task: &Task) -> Self {
        Self {
            priority: task.priority(),
            minor: task.minor_priority(),
            runtime: Reverse(task.runtime()),
        }
    }
}

/// Picks the task that should run next; the earliest one wins a full tie.
pub(crate) fn pick(candidates: &[Task]) -> Option<&Task> {
    let mut best: Option<(&Task, Rank)> = None;
    for task in candidates {
        let rank = Rank::of(task);
        match &best {
            Some((_, top)) if rank.cmp(top) != Ordering::Greater => {}
            _ => best = Some((task, rank)),
        }
    }
    best.map(|(task, _)| task)
}

/// Sorts tasks into the order the loop would pick them right now.
pub(crate) fn rank(mut tasks: Vec<Task>) -> Vec<Task> {
    // stable: ties keep pool order
    tasks.sort_by_cached_key(|t| Reverse(Rank::of(t)));
    tasks
}
