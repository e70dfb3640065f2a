//! # taskdriver
//!
//! **Taskdriver** is a cooperative, time-sliced scheduler for resumable computations.
//!
//! It runs many long computations "concurrently" on one loop by advancing them one
//! suspension step at a time, always picking the most important unfinished task
//! (priority, then secondary priority, then the least accumulated runtime). Each step
//! may produce a concrete value, an asynchronous one, or a collection of both; the
//! loop waits for it and feeds the result back into the computation on its next step.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │     Task     │   │     Task     │   │     Task     │
//!     │ (prio 2, A)  │   │ (prio 1, B)  │   │ (prio 1, C)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Driver (cloneable handle)                                        │
//! │  - pool (insertion ordered, unique names)                         │
//! │  - stage machine  Init/Running/Paused/Stopping/Done/Error         │
//! │  - EventBus (inline handlers) + SubscriberSet (async observers)   │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                     ┌─────────────────────┐
//!                     │  loop (tokio task)  │
//!                     └──────────┬──────────┘
//!                                ▼
//!   cadence gate ─► pick best ─► advance once ─► normalize + wait ─► commit
//!        ▲                                                             │
//!        └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Events
//! ```text
//! Start, Paused, Resumed, Stopping     driver bus + every pooled task
//! Yield, TaskDone, TaskFailed,         driver bus + that task
//! TaskDropped, TaskStageChanged
//! Empty, Stopped, DriverStageChanged   driver bus
//! Crashed                              driver bus + every pooled task
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Driver**        | Pool, loop, lifecycle, dynamic add/drop.                      | [`Driver`], [`DriverBuilder`]              |
//! | **Tasks**         | Resumable computations and their scheduling handle.           | [`Computation`], [`Task`], [`Serial`]      |
//! | **Values**        | Concrete, asynchronous and collected produced values.         | [`Yielded`], [`normalize`]                 |
//! | **Cadence**       | When the loop may take its next step.                         | [`Cadence`], [`Deferred`], [`Idle`], [`All`] |
//! | **Events**        | Lifecycle notifications, sync handlers and async subscribers. | [`EventBus`], [`Subscribe`]                |
//! | **Policies**      | Host veto over rounds and tasks.                              | [`RunPolicy`], [`TaskFilter`]              |
//! | **Errors**        | Typed errors for the driver and for task steps.               | [`DriverError`], [`TaskError`]             |
//! | **Configuration** | Auto start, idle yielding.                                    | [`DriverConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::json;
//! use taskdriver::{Driver, DriverConfig, Task, Yielded, from_iter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), taskdriver::DriverError> {
//!     let driver = Driver::builder(DriverConfig::default())
//!         .with_callback(|v| println!("value: {v}"))
//!         .build()?;
//!
//!     // A task yielding a concrete value, then an asynchronous one
//!     let fetch = Task::builder(from_iter([
//!         Yielded::value(json!({"page": 1})),
//!         Yielded::future(async {
//!             tokio::time::sleep(Duration::from_millis(5)).await;
//!             Ok(json!({"page": 2}))
//!         }),
//!     ]))
//!     .name("fetch")
//!     .priority(1)
//!     .build();
//!
//!     driver.add_task(fetch)?;
//!     driver.start()?;
//!     driver.join().await
//! }
//! ```
mod cadence;
mod core;
mod error;
mod events;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use cadence::{All, Cadence, CancelHandle, Continuation, Deferred, Idle, Immediate, JitterPolicy};
pub use core::{
    AddOptions, Driver, DriverBuilder, DriverConfig, DriverStage, RunAll, RunPolicy, TaskFilter,
    ValueCallback,
};
pub use error::{DriverError, TaskError};
pub use events::{Event, EventBus, EventKind, Handler, SubscriptionId};
pub use serde_json::Value;
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{
    Computation, FnComputation, IterComputation, Serial, Step, Task, TaskBuilder, TaskStage,
    Yielded, from_fn, from_iter, measure, normalize,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
