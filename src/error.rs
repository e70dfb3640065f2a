//! Error types used by the driver runtime and by tasks.
//!
//! This module defines two main error enums:
//!
//! - [`DriverError`]: errors raised by the driver itself: usage errors returned from
//!   lifecycle calls, and faults of the scheduling loop.
//! - [`TaskError`]: errors raised by a single task step (the computation failed,
//!   panicked, or its asynchronous value was rejected).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging.
//! Task errors never escape the loop: they are attached to the task and reported
//! through [`EventKind::TaskFailed`](crate::EventKind::TaskFailed).

use thiserror::Error;

use crate::core::DriverStage;

/// # Errors produced by the driver.
///
/// Two families live here:
/// - **usage errors** (`AlreadyRunning`, `InvalidTransition`, `DuplicateName`, `Disposed`,
///   `NoRuntime`) are returned synchronously to the caller and leave the driver untouched;
/// - **faults** (`CadenceClosed`, `Invariant`, `LoopPanicked`) move the driver to
///   [`DriverStage::Error`], emit [`EventKind::Crashed`](crate::EventKind::Crashed) and are
///   surfaced from [`Driver::join`](crate::Driver::join).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// `start()` was called while a loop is already active.
    #[error("driver is already active (stage {stage})")]
    AlreadyRunning {
        /// Stage observed at the time of the call.
        stage: DriverStage,
    },

    /// Lifecycle operation is not valid from the current stage.
    #[error("cannot {op} from stage {stage}")]
    InvalidTransition {
        /// Operation that was attempted.
        op: &'static str,
        /// Stage observed at the time of the call.
        stage: DriverStage,
    },

    /// A task with the same name is already in the pool.
    #[error("task `{name}` already exists")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// The driver was disposed and cannot be used anymore.
    #[error("driver is disposed")]
    Disposed,

    /// `start()` was called outside of a tokio runtime.
    #[error("no tokio runtime available to spawn the driver loop")]
    NoRuntime,

    /// The cadence strategy dropped a continuation without invoking it.
    #[error("cadence dropped the scheduling continuation")]
    CadenceClosed,

    /// Internal bookkeeping was found in an impossible state.
    #[error("invariant violated: {detail}")]
    Invariant {
        /// What was violated.
        detail: String,
    },

    /// The loop panicked outside of task code (e.g. in a callback or hook).
    #[error("driver loop panicked: {info}")]
    LoopPanicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl DriverError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskdriver::DriverError;
    ///
    /// let err = DriverError::DuplicateName { name: "a".into() };
    /// assert_eq!(err.as_label(), "driver_duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverError::AlreadyRunning { .. } => "driver_already_running",
            DriverError::InvalidTransition { .. } => "driver_invalid_transition",
            DriverError::DuplicateName { .. } => "driver_duplicate_name",
            DriverError::Disposed => "driver_disposed",
            DriverError::NoRuntime => "driver_no_runtime",
            DriverError::CadenceClosed => "driver_cadence_closed",
            DriverError::Invariant { .. } => "driver_invariant",
            DriverError::LoopPanicked { .. } => "driver_loop_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DriverError::AlreadyRunning { stage } => format!("already running: stage={stage}"),
            DriverError::InvalidTransition { op, stage } => {
                format!("invalid transition: op={op} stage={stage}")
            }
            DriverError::DuplicateName { name } => format!("duplicate task name: {name}"),
            DriverError::Disposed => "disposed".to_string(),
            DriverError::NoRuntime => "no runtime".to_string(),
            DriverError::CadenceClosed => "cadence closed".to_string(),
            DriverError::Invariant { detail } => format!("invariant: {detail}"),
            DriverError::LoopPanicked { info } => format!("loop panicked: {info}"),
        }
    }

    /// Indicates whether the error is a caller mistake rather than a loop fault.
    ///
    /// # Example
    /// ```
    /// use taskdriver::DriverError;
    ///
    /// assert!(DriverError::Disposed.is_usage());
    /// assert!(!DriverError::CadenceClosed.is_usage());
    /// ```
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            DriverError::AlreadyRunning { .. }
                | DriverError::InvalidTransition { .. }
                | DriverError::DuplicateName { .. }
                | DriverError::Disposed
                | DriverError::NoRuntime
        )
    }
}

/// # Errors produced by a task step.
///
/// Attached to the task ([`Task::error`](crate::Task::error)) once it reaches
/// [`TaskStage::Error`](crate::TaskStage::Error).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The computation returned an error from `advance`.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The computation panicked while advancing.
    #[error("computation panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// An asynchronous produced value resolved to an error.
    #[error("asynchronous value rejected: {error}")]
    Rejected {
        /// The underlying error message.
        error: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`TaskError::Rejected`].
    pub fn rejected(error: impl Into<String>) -> Self {
        TaskError::Rejected {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskdriver::TaskError;
    ///
    /// let err = TaskError::fail("boom");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Rejected { .. } => "task_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Rejected { error } => format!("rejected: {error}"),
        }
    }
}

/// Renders a panic payload caught by `catch_unwind` as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_fault_are_told_apart() {
        let usage = [
            DriverError::AlreadyRunning {
                stage: DriverStage::Running,
            },
            DriverError::InvalidTransition {
                op: "pause",
                stage: DriverStage::Init,
            },
            DriverError::DuplicateName { name: "a".into() },
            DriverError::Disposed,
            DriverError::NoRuntime,
        ];
        for err in usage {
            assert!(err.is_usage(), "{err:?} should be a usage error");
        }

        let faults = [
            DriverError::CadenceClosed,
            DriverError::Invariant {
                detail: "two steps".into(),
            },
            DriverError::LoopPanicked { info: "x".into() },
        ];
        for err in faults {
            assert!(!err.is_usage(), "{err:?} should be a fault");
        }
    }

    #[test]
    fn display_includes_stage() {
        let err = DriverError::InvalidTransition {
            op: "resume",
            stage: DriverStage::Running,
        };
        assert_eq!(err.to_string(), "cannot resume from stage running");
    }

    #[test]
    fn panic_payloads_render() {
        let s: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }
}
