use super::{Cadence, CancelHandle, Continuation};

/// Fires once the runtime had `passes` chances to run other ready work.
///
/// Each pass is a `yield_now`, which sends the waiting continuation to the back of the
/// scheduler queue. Work that keeps the runtime busy is therefore served first, which
/// approximates running "when idle" on top of tokio.
#[derive(Debug, Clone, Copy)]
pub struct Idle {
    /// Number of yields before firing (minimum 1).
    pub passes: u32,
}

impl Idle {
    /// Idle cadence yielding `passes` times before each step.
    pub fn new(passes: u32) -> Self {
        Self {
            passes: passes.max(1),
        }
    }
}

impl Default for Idle {
    /// Four passes.
    fn default() -> Self {
        Self::new(4)
    }
}

impl Cadence for Idle {
    fn schedule(&self, continuation: Continuation) -> CancelHandle {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("idle cadence used outside of a tokio runtime");
            return CancelHandle::noop();
        };

        let passes = self.passes.max(1);
        let join = rt.spawn(async move {
            for _ in 0..passes {
                tokio::task::yield_now().await;
            }
            continuation();
        });
        let abort = join.abort_handle();
        CancelHandle::new(move || abort.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn busy_work_runs_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        let o = Arc::clone(&order);
        let _h = Idle::new(3).schedule(Box::new(move || {
            o.lock().unwrap().push("idle");
            let _ = tx.send(());
        }));
        let o = Arc::clone(&order);
        tokio::spawn(async move {
            o.lock().unwrap().push("busy");
        });

        rx.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["busy", "idle"]);
    }

    #[test]
    fn passes_are_clamped() {
        assert_eq!(Idle::new(0).passes, 1);
    }
}
