//! Runtime core: the driver, its loop and its configuration.
//!
//! The public API from this module is [`Driver`] (with [`DriverBuilder`] and
//! [`DriverConfig`]), the [`DriverStage`] machine and the [`RunPolicy`] hooks.
//!
//! Internal modules:
//! - [`runner`]: the scheduling loop and the step protocol;
//! - [`shared`]: pool, in-flight bookkeeping and ordered side effects;
//! - [`select`]: candidate ordering;
//! - [`driver`]: lifecycle and pool operations on the public handle.

mod builder;
mod config;
mod driver;
mod policy;
mod runner;
mod select;
mod shared;
mod stage;

pub use builder::DriverBuilder;
pub use config::DriverConfig;
pub use driver::{AddOptions, Driver};
pub use policy::{RunAll, RunPolicy, TaskFilter};
pub use shared::ValueCallback;
pub use stage::DriverStage;
