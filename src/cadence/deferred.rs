use std::time::Duration;

use super::{Cadence, CancelHandle, Continuation, JitterPolicy};

/// Fires the continuation from a tokio timer.
///
/// A zero delay still goes through the timer, so every step gives the runtime one tick
/// to run other work (the equivalent of a zero-length timeout).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use taskdriver::{Deferred, JitterPolicy};
///
/// let tick = Deferred::zero();
/// assert_eq!(tick.delay, Duration::ZERO);
///
/// let spread = Deferred::new(Duration::from_millis(5)).with_jitter(JitterPolicy::Equal);
/// assert_eq!(spread.jitter, JitterPolicy::Equal);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Deferred {
    /// Delay before each continuation runs.
    pub delay: Duration,
    /// Randomization applied to `delay`.
    pub jitter: JitterPolicy,
}

impl Deferred {
    /// Timer-based cadence with the given delay and no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: JitterPolicy::None,
        }
    }

    /// Next-tick cadence.
    pub fn zero() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns a copy with the given jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Cadence for Deferred {
    fn schedule(&self, continuation: Continuation) -> CancelHandle {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            // Without a runtime the continuation is dropped; the loop reports it.
            tracing::warn!("deferred cadence used outside of a tokio runtime");
            return CancelHandle::noop();
        };

        let delay = self.jitter.apply(self.delay);
        let join = rt.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            continuation();
        });
        let abort = join.abort_handle();
        CancelHandle::new(move || abort.abort())
    }
}
