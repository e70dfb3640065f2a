use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Cadence, CancelHandle, Continuation};

/// Fires only after every constituent cadence fired for the current round.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use taskdriver::{All, Deferred, Idle};
///
/// // wait for a 5ms timer *and* an idle slot before each step
/// let both = All::new(vec![
///     Arc::new(Deferred::new(Duration::from_millis(5))),
///     Arc::new(Idle::default()),
/// ]);
/// assert_eq!(both.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct All {
    parts: Vec<Arc<dyn Cadence>>,
}

impl All {
    /// Fan-in over the given cadences. An empty set fires immediately.
    pub fn new(parts: Vec<Arc<dyn Cadence>>) -> Self {
        Self { parts }
    }

    /// Number of constituents.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if there are no constituents.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Cadence for All {
    fn schedule(&self, continuation: Continuation) -> CancelHandle {
        if self.parts.is_empty() {
            continuation();
            return CancelHandle::noop();
        }

        let left = Arc::new(AtomicUsize::new(self.parts.len()));
        let slot = Arc::new(Mutex::new(Some(continuation)));

        let handles: Vec<CancelHandle> = self
            .parts
            .iter()
            .map(|part| {
                let left = Arc::clone(&left);
                let slot = Arc::clone(&slot);
                part.schedule(Box::new(move || {
                    if left.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let next = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                        if let Some(next) = next {
                            next();
                        }
                    }
                }))
            })
            .collect();

        CancelHandle::new(move || {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            for h in handles {
                h.cancel();
            }
        })
    }
}

impl std::fmt::Debug for All {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("All").field("parts", &self.parts.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::{Deferred, Immediate};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn empty_fires_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        All::default()
            .schedule(Box::new(move || f.store(true, Ordering::SeqCst)))
            .cancel();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn waits_for_the_slowest_part() {
        let all = All::new(vec![
            Arc::new(Immediate),
            Arc::new(Deferred::new(Duration::from_millis(15))),
        ]);
        let (tx, rx) = oneshot::channel();
        let started = std::time::Instant::now();
        let _h = all.schedule(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn cancel_drops_the_continuation() {
        let all = All::new(vec![
            Arc::new(Deferred::new(Duration::from_millis(5))),
            Arc::new(Deferred::new(Duration::from_millis(10))),
        ]);
        let (tx, rx) = oneshot::channel::<()>();
        let h = all.schedule(Box::new(move || {
            let _ = tx.send(());
        }));
        h.cancel();
        assert!(rx.await.is_err());
    }
}
