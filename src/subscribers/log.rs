//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [start]
//! [task-stage] task=fetch init -> running
//! [yield] task=fetch value={"page":1}
//! [task-done] task=fetch value=null
//! [task-failed] task=parse err="execution failed: bad header"
//! [task-dropped] task=poll
//! [driver-stage] running -> done
//! [empty]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Not intended for production use: implement a
/// custom [`Subscribe`] for structured logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Renders one event as a single line.
    pub fn render(e: &Event) -> String {
        let label = e.kind.as_label();
        let task = e.task.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::Yield | EventKind::TaskDone => {
                let value = e
                    .value
                    .as_ref()
                    .map_or_else(|| "null".to_string(), |v| v.to_string());
                format!("[{label}] task={task} value={value}")
            }
            EventKind::TaskFailed => {
                format!("[{label}] task={task} err={:?}", e.reason.as_deref().unwrap_or(""))
            }
            EventKind::TaskDropped => format!("[{label}] task={task}"),
            EventKind::TaskStageChanged => match e.task_stage {
                Some((from, to)) => format!("[{label}] task={task} {from} -> {to}"),
                None => format!("[{label}] task={task}"),
            },
            EventKind::DriverStageChanged => match e.driver_stage {
                Some((from, to)) => format!("[{label}] {from} -> {to}"),
                None => format!("[{label}]"),
            },
            EventKind::Crashed => {
                format!("[{label}] err={:?}", e.reason.as_deref().unwrap_or(""))
            }
            EventKind::Start
            | EventKind::Empty
            | EventKind::Paused
            | EventKind::Resumed
            | EventKind::Stopping
            | EventKind::Stopped => format!("[{label}]"),
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", Self::render(e));
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskStage;
    use serde_json::json;

    #[test]
    fn renders_task_events() {
        let ev = Event::new(EventKind::Yield)
            .with_task("fetch")
            .with_value(json!({"page": 1}));
        assert_eq!(LogWriter::render(&ev), r#"[yield] task=fetch value={"page":1}"#);

        let ev = Event::new(EventKind::TaskStageChanged)
            .with_task("fetch")
            .with_task_stage(TaskStage::Init, TaskStage::Running);
        assert_eq!(
            LogWriter::render(&ev),
            "[task-stage] task=fetch init -> running"
        );

        let ev = Event::new(EventKind::TaskFailed)
            .with_task("parse")
            .with_reason("bad header");
        assert_eq!(
            LogWriter::render(&ev),
            r#"[task-failed] task=parse err="bad header""#
        );
    }

    #[test]
    fn renders_driver_events() {
        assert_eq!(LogWriter::render(&Event::new(EventKind::Empty)), "[empty]");
    }
}
