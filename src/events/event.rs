//! # Lifecycle events emitted by the driver.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Driver events**: loop flow (start, empty, paused, resumed, stopping, stopped, crashed)
//! - **Task events**: step outcomes (yielded value, completion, failure, drop)
//! - **Stage events**: one event per stage transition of a task or of the driver
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task name,
//! resolved values, failure reasons and stage transitions.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events of one task are emitted in the order its stage actually transitions.
//!
//! ## Example
//! ```rust
//! use taskdriver::{Event, EventKind, TaskStage};
//! use serde_json::json;
//!
//! let ev = Event::new(EventKind::Yield)
//!     .with_task("fetch")
//!     .with_value(json!({"page": 2}));
//!
//! assert_eq!(ev.kind, EventKind::Yield);
//! assert_eq!(ev.task.as_deref(), Some("fetch"));
//! assert_eq!(ev.value, Some(json!({"page": 2})));
//!
//! let st = Event::new(EventKind::TaskStageChanged)
//!     .with_task("fetch")
//!     .with_task_stage(TaskStage::Init, TaskStage::Running);
//! assert_eq!(st.task_stage, Some((TaskStage::Init, TaskStage::Running)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde_json::Value;

use crate::core::DriverStage;
use crate::tasks::TaskStage;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of driver events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Driver events ===
    /// The driver loop was started.
    ///
    /// Broadcast to the driver and to every pooled task.
    Start,

    /// No unfinished task remains; the loop exited and the driver is `Done`.
    Empty,

    /// The driver was paused.
    Paused,

    /// The driver was resumed.
    Resumed,

    /// `stop()` was requested; the loop is being shut down.
    Stopping,

    /// The loop observed the exit command and finished.
    Stopped,

    /// The loop hit a driver-level fault.
    ///
    /// Sets:
    /// - `reason`: fault message
    Crashed,

    // === Task events ===
    /// A task step produced an intermediate value.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `value`: resolved value
    Yield,

    /// A task finished.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `value`: resolved final value
    TaskDone,

    /// A task step failed (synchronously or while resolving its value).
    ///
    /// Sets:
    /// - `task`: task name
    /// - `reason`: failure message
    TaskFailed,

    /// A task was dropped from the pool.
    ///
    /// Sets:
    /// - `task`: task name
    TaskDropped,

    // === Stage events ===
    /// A task changed stage.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `task_stage`: `(from, to)`
    TaskStageChanged,

    /// The driver changed stage.
    ///
    /// Sets:
    /// - `driver_stage`: `(from, to)`
    DriverStageChanged,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Empty => "empty",
            EventKind::Paused => "paused",
            EventKind::Resumed => "resumed",
            EventKind::Stopping => "stopping",
            EventKind::Stopped => "stopped",
            EventKind::Crashed => "crashed",
            EventKind::Yield => "yield",
            EventKind::TaskDone => "task-done",
            EventKind::TaskFailed => "task-failed",
            EventKind::TaskDropped => "task-dropped",
            EventKind::TaskStageChanged => "task-stage",
            EventKind::DriverStageChanged => "driver-stage",
        }
    }
}

/// Driver event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the task, if applicable.
    pub task: Option<Arc<str>>,
    /// Resolved value for `Yield` and `TaskDone`.
    pub value: Option<Value>,
    /// Human-readable reason (errors, faults).
    pub reason: Option<Arc<str>>,
    /// Task stage transition `(from, to)`.
    pub task_stage: Option<(TaskStage, TaskStage)>,
    /// Driver stage transition `(from, to)`.
    pub driver_stage: Option<(DriverStage, DriverStage)>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            value: None,
            reason: None,
            task_stage: None,
            driver_stage: None,
        }
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a resolved value.
    #[inline]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task stage transition.
    #[inline]
    pub fn with_task_stage(mut self, from: TaskStage, to: TaskStage) -> Self {
        self.task_stage = Some((from, to));
        self
    }

    /// Attaches a driver stage transition.
    #[inline]
    pub fn with_driver_stage(mut self, from: DriverStage, to: DriverStage) -> Self {
        self.driver_stage = Some((from, to));
        self
    }

    /// True for events that describe a single task.
    #[inline]
    pub fn is_task_scoped(&self) -> bool {
        self.task.is_some()
    }
}
