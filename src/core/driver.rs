//! # Driver: public handle over the pool and the loop.
//!
//! [`Driver`] is a cheap cloneable handle. Lifecycle calls are synchronous, except
//! [`Driver::stop`], [`Driver::dispose`] and [`Driver::join`], which wait for the loop.
//!
//! ## Lifecycle
//! ```text
//! builder().build() ──► Init
//!      start() ──► Running ──► (loop spawned)
//!      pause()/resume()        toggles Running <-> Paused
//!      pool runs empty  ──►  Done + Empty          (restartable)
//!      stop()           ──►  Stopping ──► Done + Stopped
//!      loop fault       ──►  Error + Crashed       (join() returns the fault)
//!      dispose()        ──►  stop + clear subscriptions; every later call fails
//! ```
//!
//! ## Dropping tasks
//! A dropped task leaves the pool immediately. Unless it already finished it moves to
//! [`TaskStage::Dropped`](crate::TaskStage::Dropped), its computation is terminated and
//! `TaskStageChanged` + `TaskDropped` are emitted. When the loop is waiting on that
//! task's value, the loop settles the drop itself once it wakes up and discards the
//! value.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;
use crate::events::{Event, EventKind, SubscriptionId};
use crate::tasks::Task;

use super::{
    DriverBuilder, DriverConfig, DriverStage, runner, select,
    shared::{Outbox, Shared},
};

/// Options for [`Driver::add_task_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Replace (drop) an existing task with the same name instead of failing.
    pub overwrite: bool,
}

/// Cooperative, time-sliced scheduler for resumable tasks.
///
/// # Example
/// ```no_run
/// use taskdriver::{Driver, DriverConfig, EventKind, Task, from_iter};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), taskdriver::DriverError> {
///     let driver = Driver::builder(DriverConfig::default())
///         .with_callback(|v| println!("{v}"))
///         .build()?;
///
///     driver.add_task(Task::builder(from_iter(["low"])).priority(1).build())?;
///     driver.add_task(Task::builder(from_iter(["high"])).priority(2).build())?;
///     driver.on(EventKind::Empty, |_| println!("all done"));
///
///     driver.start()?;
///     driver.join().await
/// }
/// ```
#[derive(Clone)]
pub struct Driver {
    shared: Arc<Shared>,
}

impl Driver {
    /// Starts a builder with the given configuration.
    pub fn builder(cfg: DriverConfig) -> DriverBuilder {
        DriverBuilder::new(cfg)
    }

    /// Driver with default configuration over `tasks`.
    ///
    /// # Errors
    /// [`DriverError::DuplicateName`] if two tasks share a name.
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Result<Self, DriverError> {
        DriverBuilder::new(DriverConfig::default())
            .with_tasks(tasks)
            .build()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // ---- lifecycle ----

    /// Spawns the loop on the current tokio runtime.
    ///
    /// Clears the last error, moves to `Running` and emits `Start` to the driver and to
    /// every pooled task.
    ///
    /// # Errors
    /// - [`DriverError::Disposed`] after [`dispose`](Self::dispose);
    /// - [`DriverError::AlreadyRunning`] while `Running`, `Paused` or `Stopping`;
    /// - [`DriverError::NoRuntime`] outside of a tokio runtime.
    pub fn start(&self) -> Result<(), DriverError> {
        let rt = Handle::try_current();
        let mut out = Outbox::default();
        let exit = {
            let mut st = self.shared.lock();
            if st.disposed {
                return Err(DriverError::Disposed);
            }
            if st.stage.is_active() {
                return Err(DriverError::AlreadyRunning { stage: st.stage });
            }
            if rt.is_err() {
                return Err(DriverError::NoRuntime);
            }
            st.last_error = None;
            let exit = CancellationToken::new();
            st.exit = Some(exit.clone());
            self.shared.transition(&mut st, DriverStage::Running, &mut out);
            out.emit(Event::new(EventKind::Start), st.tasks());
            exit
        };
        self.shared.flush(out);

        if let Ok(rt) = rt {
            rt.spawn(runner::run(Arc::clone(&self.shared), exit));
        }
        Ok(())
    }

    /// Suspends selection. The loop stays alive and waits for resume or stop.
    ///
    /// # Errors
    /// [`DriverError::InvalidTransition`] unless `Running`.
    pub fn pause(&self) -> Result<(), DriverError> {
        self.toggle(
            "pause",
            DriverStage::Running,
            DriverStage::Paused,
            EventKind::Paused,
        )
    }

    /// Resumes selection after [`pause`](Self::pause).
    ///
    /// # Errors
    /// [`DriverError::InvalidTransition`] unless `Paused`.
    pub fn resume(&self) -> Result<(), DriverError> {
        self.toggle(
            "resume",
            DriverStage::Paused,
            DriverStage::Running,
            EventKind::Resumed,
        )
    }

    fn toggle(
        &self,
        op: &'static str,
        from: DriverStage,
        to: DriverStage,
        kind: EventKind,
    ) -> Result<(), DriverError> {
        let mut out = Outbox::default();
        {
            let mut st = self.shared.lock();
            if st.disposed {
                return Err(DriverError::Disposed);
            }
            if st.stage != from {
                return Err(DriverError::InvalidTransition {
                    op,
                    stage: st.stage,
                });
            }
            self.shared.transition(&mut st, to, &mut out);
            out.emit(Event::new(kind), st.tasks());
        }
        self.shared.flush(out);
        Ok(())
    }

    /// Stops the loop and empties the pool.
    ///
    /// - `Stopping`/`Done`: no-op;
    /// - `Init`/`Error`: drops every task, moves straight to `Done`;
    /// - `Running`/`Paused`: moves to `Stopping`, emits `Stopping`, drops every task,
    ///   signals the loop and waits until it reached `Done`.
    ///
    /// # Errors
    /// The loop fault, if the loop crashed while winding down.
    pub async fn stop(&self) -> Result<(), DriverError> {
        let mut out = Outbox::default();
        let exit = {
            let mut st = self.shared.lock();
            match st.stage {
                DriverStage::Stopping | DriverStage::Done => return Ok(()),
                DriverStage::Init | DriverStage::Error => {
                    self.shared.drop_all_locked(&mut st, &mut out);
                    self.shared.transition(&mut st, DriverStage::Done, &mut out);
                    None
                }
                DriverStage::Running | DriverStage::Paused => {
                    self.shared
                        .transition(&mut st, DriverStage::Stopping, &mut out);
                    out.emit(Event::new(EventKind::Stopping), st.tasks());
                    self.shared.drop_all_locked(&mut st, &mut out);
                    st.exit.take()
                }
            }
        };
        self.shared.flush(out);

        let Some(exit) = exit else {
            return Ok(());
        };
        exit.cancel();
        self.join().await
    }

    /// Stops the driver, releases every subscription and shuts down subscribers.
    ///
    /// Afterwards `start`, `pause`, `resume` and `add_task` fail with
    /// [`DriverError::Disposed`]; `stop`, `dispose` and the drop calls are no-ops.
    ///
    /// # Errors
    /// The loop fault, if the loop crashed while stopping.
    pub async fn dispose(&self) -> Result<(), DriverError> {
        let owned = {
            let mut st = self.shared.lock();
            if st.disposed {
                return Ok(());
            }
            st.disposed = true;
            st.tasks()
        };

        let stopped = self.stop().await;

        let mut out = Outbox::default();
        {
            let mut st = self.shared.lock();
            self.shared.drop_all_locked(&mut st, &mut out);
        }
        self.shared.flush(out);

        for task in &owned {
            task.bus().clear();
        }
        self.shared.bus.clear();
        self.shared.subs.shutdown().await;
        tracing::debug!("driver disposed");
        stopped
    }

    /// Waits until the current loop is no longer active.
    ///
    /// Returns immediately when no loop is running.
    ///
    /// # Errors
    /// The fault that crashed the loop (stage `Error`).
    pub async fn join(&self) -> Result<(), DriverError> {
        let mut rx = self.shared.watch();
        let _ = rx.wait_for(|s| !s.is_active()).await;

        let st = self.shared.lock();
        match (&st.stage, &st.last_error) {
            (DriverStage::Error, Some(err)) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    // ---- pool ----

    /// Adds a task to the pool.
    ///
    /// # Errors
    /// - [`DriverError::DuplicateName`] if the name is taken (pool unchanged);
    /// - [`DriverError::Disposed`] after [`dispose`](Self::dispose);
    /// - with `auto_start`, whatever [`start`](Self::start) returns (the task stays pooled).
    pub fn add_task(&self, task: Task) -> Result<(), DriverError> {
        self.add_task_with(task, AddOptions::default())
    }

    /// Adds a task; with `overwrite` an existing task of the same name is dropped first.
    ///
    /// # Errors
    /// See [`add_task`](Self::add_task).
    pub fn add_task_with(&self, task: Task, opts: AddOptions) -> Result<(), DriverError> {
        let mut out = Outbox::default();
        let auto_start = {
            let mut st = self.shared.lock();
            if st.disposed {
                return Err(DriverError::Disposed);
            }
            if let Some(existing) = st.pool.get(task.name()).cloned() {
                if existing.ptr_eq(&task) {
                    return Ok(());
                }
                if !opts.overwrite {
                    return Err(DriverError::DuplicateName {
                        name: task.name().to_string(),
                    });
                }
                self.shared.drop_locked(&mut st, [existing], &mut out);
            }
            st.pool.insert(task.name_arc(), task);
            self.shared.cfg.auto_start && !st.stage.is_active()
        };
        self.shared.flush(out);

        if auto_start {
            match self.start() {
                Ok(()) | Err(DriverError::AlreadyRunning { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Drops the given tasks. Tasks not in the pool are ignored.
    pub fn drop_tasks(&self, tasks: &[Task]) {
        let mut out = Outbox::default();
        {
            let mut st = self.shared.lock();
            self.shared
                .drop_locked(&mut st, tasks.iter().cloned(), &mut out);
        }
        self.shared.flush(out);
    }

    /// Drops pooled tasks by name. Unknown names are ignored.
    pub fn drop_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Outbox::default();
        {
            let mut st = self.shared.lock();
            let tasks: Vec<Task> = names
                .into_iter()
                .filter_map(|n| st.pool.get(n.as_ref()).cloned())
                .collect();
            self.shared.drop_locked(&mut st, tasks, &mut out);
        }
        self.shared.flush(out);
    }

    /// Drops every pooled task.
    pub fn drop_all(&self) {
        let mut out = Outbox::default();
        {
            let mut st = self.shared.lock();
            self.shared.drop_all_locked(&mut st, &mut out);
        }
        self.shared.flush(out);
    }

    // ---- accessors ----

    /// Pooled tasks that are neither done, failed nor dropped, in pool order.
    pub fn unfinished_tasks(&self) -> Vec<Task> {
        self.shared.lock().unfinished()
    }

    /// Unfinished tasks in the order they would be selected right now.
    pub fn upcoming(&self) -> Vec<Task> {
        select::rank(self.unfinished_tasks())
    }

    /// Every pooled task, in pool order.
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.lock().tasks()
    }

    /// Pooled task by name.
    pub fn task(&self, name: &str) -> Option<Task> {
        self.shared.lock().pool.get(name).cloned()
    }

    /// Current stage.
    pub fn stage(&self) -> DriverStage {
        self.shared.stage()
    }

    /// Fault of the last crashed loop, cleared by [`start`](Self::start).
    pub fn last_error(&self) -> Option<DriverError> {
        self.shared.lock().last_error.clone()
    }

    /// True while `Running`.
    pub fn is_running(&self) -> bool {
        self.stage() == DriverStage::Running
    }

    /// True while `Paused`.
    pub fn is_paused(&self) -> bool {
        self.stage() == DriverStage::Paused
    }

    /// True after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    // ---- events ----

    /// Subscribes to driver events of `kind` (all tasks included).
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(kind, handler)
    }

    /// Subscribes to the next driver event of `kind`.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe_once(kind, handler)
    }

    /// Removes driver subscriptions, see [`EventBus::unsubscribe`](crate::EventBus::unsubscribe).
    pub fn off(&self, kind: Option<EventKind>, id: Option<SubscriptionId>) {
        self.shared.bus.unsubscribe(kind, id);
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.lock();
        f.debug_struct("Driver")
            .field("stage", &st.stage)
            .field("tasks", &st.pool.len())
            .field("disposed", &st.disposed)
            .finish()
    }
}
