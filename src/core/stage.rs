use std::fmt;

/// Lifecycle stage of a [`Driver`](crate::Driver).
///
/// ```text
///   Init ──start──► Running ◄──resume── Paused
///    │                │  └────pause──────►│
///    │                │                   │
///    │            (pool empty)       stop │
///    │                ▼                   ▼
///    └───stop────► Done ◄───────────── Stopping
///                   ▲
///   Error ──stop────┘        (any loop fault ──► Error)
/// ```
///
/// `Done` and `Error` are restartable with `start()`. Disposal is tracked separately
/// and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverStage {
    /// Constructed, never started.
    #[default]
    Init,
    /// Loop is selecting and stepping tasks.
    Running,
    /// Loop is alive but selects nothing until resumed.
    Paused,
    /// Stop was requested; the loop is winding down.
    Stopping,
    /// Loop exited normally (empty pool or stop).
    Done,
    /// Loop exited because of a fault.
    Error,
}

impl DriverStage {
    /// True while a loop is alive (`Running`, `Paused` or `Stopping`).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DriverStage::Running | DriverStage::Paused | DriverStage::Stopping
        )
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverStage::Init => "init",
            DriverStage::Running => "running",
            DriverStage::Paused => "paused",
            DriverStage::Stopping => "stopping",
            DriverStage::Done => "done",
            DriverStage::Error => "error",
        }
    }
}

impl fmt::Display for DriverStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
