use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    cadence::{Cadence, Deferred},
    error::DriverError,
    subscribers::{Subscribe, SubscriberSet},
    tasks::Task,
};

use super::{
    DriverConfig, RunAll, RunPolicy,
    driver::Driver,
    shared::{Shared, ValueCallback},
};

/// Builder for constructing a [`Driver`] with optional features.
///
/// # Example
/// ```
/// use taskdriver::{Driver, DriverConfig, Immediate, Task, from_iter};
///
/// let driver = Driver::builder(DriverConfig::default())
///     .with_cadence(Immediate)
///     .with_callback(|v| println!("value: {v}"))
///     .with_tasks([Task::named("count", from_iter([1, 2, 3]))])
///     .build()
///     .unwrap();
///
/// assert_eq!(driver.tasks().len(), 1);
/// ```
pub struct DriverBuilder {
    cfg: DriverConfig,
    cadence: Arc<dyn Cadence>,
    callback: Option<ValueCallback>,
    policy: Arc<dyn RunPolicy>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    tasks: Vec<Task>,
}

impl DriverBuilder {
    /// Creates a new builder with the given configuration.
    ///
    /// Defaults: [`Deferred::zero`] cadence, no callback, [`RunAll`] policy.
    pub fn new(cfg: DriverConfig) -> Self {
        Self {
            cfg,
            cadence: Arc::new(Deferred::zero()),
            callback: None,
            policy: Arc::new(RunAll),
            subscribers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Sets the strategy that gates every iteration of the loop.
    pub fn with_cadence(mut self, cadence: impl Cadence) -> Self {
        self.cadence = Arc::new(cadence);
        self
    }

    /// Sets the callback invoked synchronously with every yielded value.
    ///
    /// The callback runs inside the step, before the next selection. A panic in it
    /// crashes the loop.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Sets the host veto over rounds and tasks.
    pub fn with_policy(mut self, policy: impl RunPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every driver event through dedicated workers with bounded
    /// queues. Workers are spawned by [`build`](Self::build), which therefore needs a
    /// tokio runtime for subscribers to be active.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds initial tasks to the pool, in order.
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Builds the driver in stage [`Init`](super::DriverStage::Init).
    ///
    /// # Errors
    /// [`DriverError::DuplicateName`] if two initial tasks share a name.
    pub fn build(self) -> Result<Driver, DriverError> {
        let mut pool = IndexMap::with_capacity(self.tasks.len());
        for task in self.tasks {
            if pool.contains_key(task.name()) {
                return Err(DriverError::DuplicateName {
                    name: task.name().to_string(),
                });
            }
            pool.insert(task.name_arc(), task);
        }

        let subs = SubscriberSet::new(self.subscribers);
        let shared = Shared::new(
            self.cfg,
            self.cadence,
            self.callback,
            self.policy,
            subs,
            pool,
        );
        Ok(Driver::from_shared(Arc::new(shared)))
    }
}
