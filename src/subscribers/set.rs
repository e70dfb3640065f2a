//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`](crate::Event) to multiple
//! subscribers **without awaiting** their processing, so a slow observer never
//! holds back the scheduling loop.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (events are dropped for that
//!   subscriber).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::panic_message;
use crate::events::Event;

use super::Subscribe;

/// One subscriber's queue and the worker draining it.
struct Feed {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    feeds: Mutex<Vec<Feed>>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Workers need a tokio runtime; outside of one the subscribers are skipped with a warning.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let rt = tokio::runtime::Handle::try_current();
        let feeds = subs
            .into_iter()
            .filter_map(|sub| {
                let Ok(rt) = rt.as_ref() else {
                    tracing::warn!(subscriber = sub.name(), "no tokio runtime; subscriber skipped");
                    return None;
                };
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                Some(Feed {
                    name: sub.name(),
                    tx,
                    worker: rt.spawn(pump(sub, rx)),
                })
            })
            .collect();
        Self {
            feeds: Mutex::new(feeds),
        }
    }

    /// Queues one event for every subscriber without waiting.
    ///
    /// A subscriber whose queue is full (or whose worker is gone) misses the event;
    /// the loss is logged with the subscriber's name and the event's `seq`.
    pub fn emit(&self, event: &Event) {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        if feeds.is_empty() {
            return;
        }
        let ev = Arc::new(event.clone());
        for feed in feeds.iter() {
            if let Err(err) = feed.tx.try_send(Arc::clone(&ev)) {
                let why = match err {
                    TrySendError::Full(_) => "queue full",
                    TrySendError::Closed(_) => "worker gone",
                };
                tracing::warn!(
                    subscriber = feed.name,
                    seq = ev.seq,
                    kind = ev.kind.as_label(),
                    "subscriber missed event: {why}"
                );
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    ///
    /// Events queued before the call are still delivered. Later `emit` calls are no-ops.
    pub async fn shutdown(&self) {
        let feeds: Vec<Feed> = self
            .feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for Feed { tx, worker, .. } in feeds {
            drop(tx);
            let _ = worker.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Worker body: delivers queued events one by one until the queue closes.
async fn pump(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
        if let Err(payload) = delivery.await {
            tracing::warn!(
                subscriber = sub.name(),
                seq = ev.seq,
                panic = %panic_message(payload.as_ref()),
                "subscriber panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;

    struct Recorder {
        seen: Arc<Mutex<Vec<EventKind>>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber failure");
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_panics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(vec![
            Arc::new(Panicky),
            Arc::new(Recorder {
                seen: Arc::clone(&seen),
            }),
        ]);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::Start));
        set.emit(&Event::new(EventKind::Yield));
        set.emit(&Event::new(EventKind::Empty));
        set.shutdown().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Start, EventKind::Yield, EventKind::Empty]
        );
        assert!(set.is_empty());
    }

    struct Narrow {
        seen: Arc<Mutex<Vec<EventKind>>>,
    }

    #[async_trait]
    impl Subscribe for Narrow {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn full_queue_drops_only_the_overflow() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(vec![Arc::new(Narrow {
            seen: Arc::clone(&seen),
        })]);

        // the worker cannot run between these calls on a current-thread runtime
        set.emit(&Event::new(EventKind::Start));
        set.emit(&Event::new(EventKind::Yield));
        set.emit(&Event::new(EventKind::Empty));
        set.shutdown().await;

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Start]);
        set.emit(&Event::new(EventKind::Stopped));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn outside_runtime_skips_subscribers() {
        let set = SubscriberSet::new(vec![Arc::new(Panicky)]);
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::Start));
    }
}
