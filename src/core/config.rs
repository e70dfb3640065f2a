//! # Driver configuration.
//!
//! Provides [`DriverConfig`], the small set of knobs that change how the loop behaves.
//! Everything else (cadence, callback, policy, subscribers) is wired through
//! [`DriverBuilder`](crate::DriverBuilder).
//!
//! # Example
//! ```
//! use taskdriver::DriverConfig;
//!
//! let mut cfg = DriverConfig::default();
//! cfg.auto_start = true;
//!
//! assert!(cfg.auto_start);
//! assert!(cfg.yield_when_idle);
//! ```

/// Configuration for one driver instance.
///
/// ## Field semantics
/// - `auto_start`: adding a task to an inactive driver starts it
/// - `yield_when_idle`: rounds that select nothing yield to the runtime
///
/// ## Notes
/// All fields are public; the defaults match a manually started driver.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Start the loop automatically when a task is added.
    ///
    /// Only applies while the driver is not active (`Init`, `Done` or `Error`).
    /// A disposed driver never restarts.
    pub auto_start: bool,

    /// Yield to the tokio scheduler on idle rounds.
    ///
    /// A round is idle when the run policy vetoes it or when every unfinished task
    /// is ineligible. With an [`Immediate`](crate::Immediate) cadence such rounds
    /// would otherwise spin without ever giving the runtime a chance to run the
    /// host code that changes eligibility.
    pub yield_when_idle: bool,
}

impl Default for DriverConfig {
    /// Default configuration:
    ///
    /// - `auto_start = false`
    /// - `yield_when_idle = true`
    fn default() -> Self {
        Self {
            auto_start: false,
            yield_when_idle: true,
        }
    }
}
