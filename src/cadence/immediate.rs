use super::{Cadence, CancelHandle, Continuation};

/// Runs the continuation synchronously inside `schedule`.
///
/// Steps follow each other without going back to the runtime in between; pair it with
/// `DriverConfig::yield_when_idle` when the host must stay responsive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Cadence for Immediate {
    fn schedule(&self, continuation: Continuation) -> CancelHandle {
        continuation();
        CancelHandle::noop()
    }
}
