//! # Serial composition of computations.
//!
//! [`Serial`] runs several computations back to back as a single one: every value
//! yielded by the current computation is forwarded, and when it completes the next
//! one starts within the same step. Completion values of the inner computations are
//! discarded; the composite completes with `null` after the last one.
//!
//! ```text
//! Serial[a, b]:  a.yield ─► a.yield ─► (a done) b.yield ─► (b done) ─► Complete(null)
//! ```

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::computation::{Computation, Step};
use crate::tasks::yielded::Yielded;

/// Chains computations so they run one after another.
pub struct Serial {
    current: Option<Box<dyn Computation>>,
    pending: VecDeque<Box<dyn Computation>>,
}

impl Serial {
    /// Creates a chain from the given computations (run in order).
    pub fn new(parts: impl IntoIterator<Item = Box<dyn Computation>>) -> Self {
        Self {
            current: None,
            pending: parts.into_iter().collect(),
        }
    }

    /// Appends one more computation to the chain.
    pub fn then(mut self, next: impl Computation) -> Self {
        self.pending.push_back(Box::new(next));
        self
    }

    /// Number of computations not finished yet.
    pub fn remaining(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }
}

impl Computation for Serial {
    fn advance(&mut self, input: Value) -> Result<Step, TaskError> {
        // A freshly started part gets `null`, not the value meant for its predecessor.
        let mut input = Some(input);
        loop {
            if self.current.is_none() {
                match self.pending.pop_front() {
                    Some(next) => {
                        self.current = Some(next);
                        input = Some(Value::Null);
                    }
                    None => return Ok(Step::Complete(Yielded::null())),
                }
            }
            let Some(current) = self.current.as_mut() else {
                continue;
            };

            match current.advance(input.take().unwrap_or(Value::Null))? {
                step @ Step::Yield(_) => return Ok(step),
                Step::Complete(_) => {
                    self.current = None;
                }
            }
        }
    }

    fn terminate(&mut self) {
        if let Some(mut c) = self.current.take() {
            c.terminate();
        }
        for mut c in self.pending.drain(..) {
            c.terminate();
        }
    }
}
