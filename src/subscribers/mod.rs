//! # Asynchronous event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! used by the driver to hand lifecycle events to slow observers off the loop.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Driver ── emit(Event) ──► EventBus handlers   (inline, in the loop)
//!                        └──► SubscriberSet        (queued, off the loop)
//!                                  │
//!                             ┌────┴────┬─────────┐
//!                             ▼         ▼         ▼
//!                          LogWriter  Metrics   Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use taskdriver::{Subscribe, Event, EventKind};
//! use async_trait::async_trait;
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::TaskFailed {
//!             // increment failure counter
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
