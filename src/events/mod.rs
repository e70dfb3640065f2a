//! Lifecycle events: types and publish/subscribe bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the driver.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`EventBus`] synchronous registry keyed by kind (one per driver, one per task)
//!
//! ## Quick reference
//! - **Publishers**: the driver loop (step outcomes, stage changes) and driver
//!   lifecycle calls (`start`, `pause`, `resume`, `drop`, `stop`).
//! - **Consumers**: handlers registered on `Driver::on` / `Task::on`, and async
//!   [`Subscribe`](crate::Subscribe) observers fed through a `SubscriberSet`.

mod bus;
mod event;

pub use bus::{EventBus, Handler, SubscriptionId};
pub use event::{Event, EventKind};
