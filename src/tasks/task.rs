//! # Task handle.
//!
//! A [`Task`] wraps one resumable [`Computation`] plus its scheduling metadata:
//! name, priorities, accumulated runtime, last exchanged value and stage.
//!
//! `Task` is a cheap cloneable handle. The embedding application keeps a clone to
//! adjust priorities or subscribe to the task's own events while the driver owns
//! the stage and runtime bookkeeping.
//!
//! ## Ownership
//! ```text
//! host                          driver
//!  ├─ set_priority()             ├─ set_stage()        (crate-private)
//!  ├─ set_minor_priority()       ├─ add_runtime()      (crate-private)
//!  └─ on()/once()/off()          └─ set_exchange()     (crate-private)
//! ```
//!
//! Priority fields are atomics: they are written by the host at any time and read by
//! the driver only when it selects the next task.

use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde_json::Value;

use crate::error::{TaskError, panic_message};
use crate::events::{Event, EventBus, EventKind, SubscriptionId};
use crate::tasks::computation::{Computation, Step};

/// Counter used for generated names.
static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lifecycle stage of a task.
///
/// ```text
/// Init ──► Running ──► Done
///                  ├─► Error
///                  └─► Dropped      (Init ──► Dropped as well)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStage {
    /// Never advanced.
    Init,
    /// Advanced at least once and not finished.
    Running,
    /// Computation completed.
    Done,
    /// Computation failed.
    Error,
    /// Removed by `drop`.
    Dropped,
}

impl TaskStage {
    /// True for `Done`, `Error` and `Dropped`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Done | TaskStage::Error | TaskStage::Dropped)
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskStage::Init => "init",
            TaskStage::Running => "running",
            TaskStage::Done => "done",
            TaskStage::Error => "error",
            TaskStage::Dropped => "dropped",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Driver-owned bookkeeping.
struct Books {
    stage: TaskStage,
    runtime: Duration,
    exchange: Value,
    error: Option<TaskError>,
}

/// The computation and whether it was already unwound.
struct Body {
    computation: Box<dyn Computation>,
    terminated: bool,
}

struct Inner {
    name: Arc<str>,
    priority: AtomicI64,
    minor_priority: AtomicI64,
    books: Mutex<Books>,
    body: Mutex<Body>,
    /// Set by the first `terminate`; the unwind itself may run later.
    terminating: AtomicBool,
    bus: EventBus,
}

/// Shared handle to one schedulable computation.
///
/// # Example
/// ```
/// use taskdriver::{Task, TaskStage, from_iter};
///
/// let task = Task::builder(from_iter(["a", "b"]))
///     .name("letters")
///     .priority(2)
///     .build();
///
/// assert_eq!(task.name(), "letters");
/// assert_eq!(task.priority(), 2);
/// assert_eq!(task.stage(), TaskStage::Init);
///
/// task.set_priority(5); // takes effect on the next selection
/// assert_eq!(task.priority(), 5);
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Task {
    /// Creates a task with a generated name and zero priorities.
    pub fn new(computation: impl Computation) -> Self {
        Self::builder(computation).build()
    }

    /// Creates a named task with zero priorities.
    pub fn named(name: impl Into<Cow<'static, str>>, computation: impl Computation) -> Self {
        Self::builder(computation).name(name).build()
    }

    /// Starts a builder for a task.
    pub fn builder(computation: impl Computation) -> TaskBuilder {
        TaskBuilder::new(Box::new(computation))
    }

    /// Stable name, unique within one driver pool.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.inner.name)
    }

    /// Primary ordering key: higher runs first.
    pub fn priority(&self) -> i64 {
        self.inner.priority.load(Ordering::Relaxed)
    }

    /// Updates the primary ordering key.
    pub fn set_priority(&self, priority: i64) {
        self.inner.priority.store(priority, Ordering::Relaxed);
    }

    /// Secondary ordering key: higher runs first among equal priorities.
    pub fn minor_priority(&self) -> i64 {
        self.inner.minor_priority.load(Ordering::Relaxed)
    }

    /// Updates the secondary ordering key.
    pub fn set_minor_priority(&self, minor: i64) {
        self.inner.minor_priority.store(minor, Ordering::Relaxed);
    }

    /// Total wall-clock time spent inside `advance` so far.
    pub fn runtime(&self) -> Duration {
        self.books().runtime
    }

    /// Current stage.
    pub fn stage(&self) -> TaskStage {
        self.books().stage
    }

    /// Error recorded when the task reached [`TaskStage::Error`].
    pub fn error(&self) -> Option<TaskError> {
        self.books().error.clone()
    }

    /// Last resolved value, sent into the computation on its next step.
    pub fn exchange(&self) -> Value {
        self.books().exchange.clone()
    }

    /// Runs one suspension step of the computation.
    ///
    /// A panic inside the computation is caught and returned as [`TaskError::Panicked`].
    /// A terminated computation is not advanced anymore and reports completion.
    pub fn advance(&self, input: Value) -> Result<Step, TaskError> {
        let res = {
            let mut body = self.body();
            if body.terminated {
                return Ok(Step::complete(()));
            }
            match catch_unwind(AssertUnwindSafe(|| body.computation.advance(input))) {
                Ok(res) => res,
                Err(payload) => Err(TaskError::Panicked {
                    info: panic_message(payload.as_ref()),
                }),
            }
        };
        // a terminate that arrived mid-step was deferred to here
        if self.inner.terminating.load(Ordering::SeqCst) {
            self.unwind(self.body());
        }
        res
    }

    /// Forces the computation to unwind early. Idempotent.
    ///
    /// Safe to call from inside the task's own computation: while a step is running
    /// the unwind is deferred until that step returns.
    pub fn terminate(&self) {
        self.inner.terminating.store(true, Ordering::SeqCst);
        match self.inner.body.try_lock() {
            Ok(body) => self.unwind(body),
            Err(TryLockError::Poisoned(poisoned)) => self.unwind(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }
    }

    /// True once [`Task::terminate`] was called.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminating.load(Ordering::SeqCst)
    }

    fn unwind(&self, mut body: MutexGuard<'_, Body>) {
        if body.terminated {
            return;
        }
        body.terminated = true;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body.computation.terminate())) {
            tracing::warn!(
                task = %self.inner.name,
                panic = %panic_message(payload.as_ref()),
                "computation panicked while terminating"
            );
        }
    }

    /// Subscribes to events concerning this task.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    /// Subscribes to the next event of `kind` concerning this task.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe_once(kind, handler)
    }

    /// Removes subscriptions, see [`EventBus::unsubscribe`].
    pub fn off(&self, kind: Option<EventKind>, id: Option<SubscriptionId>) {
        self.inner.bus.unsubscribe(kind, id);
    }

    /// True if both handles point to the same task.
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- driver-side bookkeeping ----

    pub(crate) fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Moves to `to`; returns the previous stage when it actually changed.
    pub(crate) fn set_stage(&self, to: TaskStage) -> Option<TaskStage> {
        let mut books = self.books();
        let from = books.stage;
        if from == to {
            return None;
        }
        books.stage = to;
        Some(from)
    }

    /// Moves to `to` only if the task is not terminal yet.
    pub(crate) fn advance_stage(&self, to: TaskStage) -> Option<TaskStage> {
        let mut books = self.books();
        let from = books.stage;
        if from.is_terminal() || from == to {
            return None;
        }
        books.stage = to;
        Some(from)
    }

    pub(crate) fn fail(&self, err: TaskError) -> Option<TaskStage> {
        let mut books = self.books();
        let from = books.stage;
        if from.is_terminal() {
            return None;
        }
        books.stage = TaskStage::Error;
        books.error = Some(err);
        Some(from)
    }

    pub(crate) fn add_runtime(&self, took: Duration) {
        self.books().runtime += took;
    }

    pub(crate) fn set_exchange(&self, value: Value) {
        self.books().exchange = value;
    }

    fn books(&self) -> MutexGuard<'_, Books> {
        self.inner.books.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn body(&self) -> MutexGuard<'_, Body> {
        self.inner.body.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let books = self.books();
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("priority", &self.priority())
            .field("minor_priority", &self.minor_priority())
            .field("stage", &books.stage)
            .field("runtime", &books.runtime)
            .finish()
    }
}

/// Builder for [`Task`] with fluent API.
pub struct TaskBuilder {
    computation: Box<dyn Computation>,
    name: Option<Cow<'static, str>>,
    priority: i64,
    minor_priority: i64,
}

impl TaskBuilder {
    fn new(computation: Box<dyn Computation>) -> Self {
        Self {
            computation,
            name: None,
            priority: 0,
            minor_priority: 0,
        }
    }

    /// Sets the task name (a `task-<n>` name is generated otherwise).
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the initial priority.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the initial minor priority.
    pub fn minor_priority(mut self, minor: i64) -> Self {
        self.minor_priority = minor;
        self
    }

    /// Builds the task.
    pub fn build(self) -> Task {
        let name: Arc<str> = match self.name {
            Some(name) => Arc::from(name.as_ref()),
            None => {
                let n = TASK_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
                Arc::from(format!("task-{n}"))
            }
        };
        Task {
            inner: Arc::new(Inner {
                name,
                priority: AtomicI64::new(self.priority),
                minor_priority: AtomicI64::new(self.minor_priority),
                books: Mutex::new(Books {
                    stage: TaskStage::Init,
                    runtime: Duration::ZERO,
                    exchange: Value::Null,
                    error: None,
                }),
                body: Mutex::new(Body {
                    computation: self.computation,
                    terminated: false,
                }),
                terminating: AtomicBool::new(false),
                bus: EventBus::new(),
            }),
        }
    }
}
