//! State shared between the [`Driver`](crate::Driver) handle and its loop.
//!
//! All bookkeeping lives behind one mutex. Side effects (events, the per-value
//! callback, `terminate()`) are collected into an [`Outbox`] while the lock is held
//! and performed after it is released, in the order they were recorded. Event
//! handlers, hooks and computations therefore never run under the driver lock and
//! are free to call back into the driver.
//!
//! Lock order: driver state, then task books. The driver lock is never held while a
//! computation is advanced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cadence::Cadence;
use crate::error::{DriverError, TaskError};
use crate::events::{Event, EventBus, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::{Task, TaskStage};

use super::{DriverConfig, DriverStage, RunPolicy};

/// Callback invoked with every value a task yields.
pub type ValueCallback = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

/// Loop control after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

impl Flow {
    pub(crate) fn after(exit: &CancellationToken) -> Self {
        if exit.is_cancelled() {
            Flow::Exit
        } else {
            Flow::Continue
        }
    }
}

/// Command injected into a suspended step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// The in-flight task was dropped: discard its value.
    Skip,
    /// The driver is stopping: leave the loop.
    Exit,
}

/// Result of a finished step, committed under the lock.
#[derive(Debug)]
pub(crate) enum Outcome {
    Yielded(Value),
    Completed(Value),
    Failed(TaskError),
}

pub(crate) struct InFlight {
    task: Task,
    skip: CancellationToken,
}

pub(crate) struct State {
    pub(crate) stage: DriverStage,
    pub(crate) disposed: bool,
    pub(crate) pool: IndexMap<Arc<str>, Task>,
    pub(crate) exit: Option<CancellationToken>,
    pub(crate) last_error: Option<DriverError>,
    in_flight: Option<InFlight>,
}

impl State {
    fn is_pooled(&self, task: &Task) -> bool {
        self.pool.get(task.name()).is_some_and(|t| t.ptr_eq(task))
    }

    pub(crate) fn tasks(&self) -> Vec<Task> {
        self.pool.values().cloned().collect()
    }

    pub(crate) fn unfinished(&self) -> Vec<Task> {
        self.pool
            .values()
            .filter(|t| !t.stage().is_terminal())
            .cloned()
            .collect()
    }
}

enum Effect {
    Emit(Event, Vec<Task>),
    Deliver(Value),
    Terminate(Task),
    SyncStage,
}

/// Side effects recorded under the lock, performed by [`Shared::flush`].
#[derive(Default)]
pub(crate) struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    /// Event for the driver bus and the given tasks' buses.
    pub(crate) fn emit(&mut self, event: Event, tasks: Vec<Task>) {
        self.effects.push(Effect::Emit(event, tasks));
    }

    /// Task-scoped event for the driver bus and that task's bus.
    fn emit_task(&mut self, task: &Task, event: Event) {
        self.effects.push(Effect::Emit(
            event.with_task(task.name_arc()),
            vec![task.clone()],
        ));
    }

    fn task_stage(&mut self, task: &Task, from: TaskStage, to: TaskStage) {
        self.emit_task(
            task,
            Event::new(EventKind::TaskStageChanged).with_task_stage(from, to),
        );
    }
}

pub(crate) struct Shared {
    pub(crate) cfg: DriverConfig,
    pub(crate) cadence: Arc<dyn Cadence>,
    pub(crate) policy: Arc<dyn RunPolicy>,
    pub(crate) bus: EventBus,
    pub(crate) subs: SubscriberSet,
    callback: Option<ValueCallback>,
    state: Mutex<State>,
    stage_tx: watch::Sender<DriverStage>,
}

impl Shared {
    pub(crate) fn new(
        cfg: DriverConfig,
        cadence: Arc<dyn Cadence>,
        callback: Option<ValueCallback>,
        policy: Arc<dyn RunPolicy>,
        subs: SubscriberSet,
        pool: IndexMap<Arc<str>, Task>,
    ) -> Self {
        let (stage_tx, _) = watch::channel(DriverStage::Init);
        Self {
            cfg,
            cadence,
            policy,
            bus: EventBus::new(),
            subs,
            callback,
            state: Mutex::new(State {
                stage: DriverStage::Init,
                disposed: false,
                pool,
                exit: None,
                last_error: None,
                in_flight: None,
            }),
            stage_tx,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver that observes stage changes after their events were emitted.
    pub(crate) fn watch(&self) -> watch::Receiver<DriverStage> {
        self.stage_tx.subscribe()
    }

    pub(crate) fn stage(&self) -> DriverStage {
        self.lock().stage
    }

    /// Performs recorded effects in order. Must be called without the lock.
    pub(crate) fn flush(&self, out: Outbox) {
        for effect in out.effects {
            match effect {
                Effect::Emit(event, tasks) => {
                    self.bus.publish(&event);
                    for task in &tasks {
                        task.bus().publish(&event);
                    }
                    self.subs.emit(&event);
                }
                Effect::Deliver(value) => {
                    if let Some(cb) = &self.callback {
                        cb(&value);
                    }
                }
                Effect::Terminate(task) => task.terminate(),
                Effect::SyncStage => {
                    let st = self.lock();
                    self.stage_tx.send_replace(st.stage);
                }
            }
        }
    }

    pub(crate) fn transition(&self, st: &mut State, to: DriverStage, out: &mut Outbox) {
        let from = st.stage;
        if from == to {
            return;
        }
        st.stage = to;
        tracing::debug!(%from, %to, "driver stage");
        out.emit(
            Event::new(EventKind::DriverStageChanged).with_driver_stage(from, to),
            Vec::new(),
        );
        out.effects.push(Effect::SyncStage);
    }

    /// Removes `tasks` from the pool. The in-flight one is only signalled; the loop
    /// settles it once it wakes up.
    pub(crate) fn drop_locked<I>(&self, st: &mut State, tasks: I, out: &mut Outbox)
    where
        I: IntoIterator<Item = Task>,
    {
        for task in tasks {
            if !st.is_pooled(&task) {
                continue;
            }
            st.pool.shift_remove(task.name());
            match &st.in_flight {
                Some(f) if f.task.ptr_eq(&task) => f.skip.cancel(),
                _ => settle_drop(&task, out),
            }
        }
    }

    pub(crate) fn drop_all_locked(&self, st: &mut State, out: &mut Outbox) {
        let all = st.tasks();
        self.drop_locked(st, all, out);
    }

    /// Claims `task` for one step. `None` when it left the pool or finished meanwhile.
    pub(crate) fn begin_step(&self, task: &Task) -> Result<Option<CancellationToken>, DriverError> {
        let mut out = Outbox::default();
        let skip = {
            let mut st = self.lock();
            if let Some(f) = &st.in_flight {
                return Err(DriverError::Invariant {
                    detail: format!("task `{}` is still in flight", f.task.name()),
                });
            }
            if !st.is_pooled(task) || task.stage().is_terminal() {
                return Ok(None);
            }
            if let Some(from) = task.advance_stage(TaskStage::Running) {
                out.task_stage(task, from, TaskStage::Running);
            }
            let skip = CancellationToken::new();
            st.in_flight = Some(InFlight {
                task: task.clone(),
                skip: skip.clone(),
            });
            skip
        };
        self.flush(out);
        Ok(Some(skip))
    }

    /// Leaves the in-flight step without using its value.
    pub(crate) fn abandon(&self, task: &Task, cmd: Command) {
        let mut out = Outbox::default();
        {
            let mut st = self.lock();
            st.in_flight = None;
            if cmd == Command::Skip {
                settle_drop(task, &mut out);
            }
        }
        tracing::debug!(task = task.name(), ?cmd, "step abandoned");
        self.flush(out);
    }

    /// Records the result of the in-flight step, unless it was dropped in the meantime.
    pub(crate) fn commit(&self, task: &Task, skip: &CancellationToken, outcome: Outcome) {
        let mut out = Outbox::default();
        {
            let mut st = self.lock();
            st.in_flight = None;
            if skip.is_cancelled() {
                settle_drop(task, &mut out);
            } else {
                match outcome {
                    Outcome::Yielded(value) => {
                        task.set_exchange(value.clone());
                        out.effects.push(Effect::Deliver(value.clone()));
                        out.emit_task(task, Event::new(EventKind::Yield).with_value(value));
                    }
                    Outcome::Completed(value) => {
                        if let Some(from) = task.advance_stage(TaskStage::Done) {
                            tracing::debug!(task = task.name(), "task done");
                            out.task_stage(task, from, TaskStage::Done);
                            out.emit_task(task, Event::new(EventKind::TaskDone).with_value(value));
                        }
                    }
                    Outcome::Failed(err) => {
                        let reason = err.to_string();
                        if let Some(from) = task.fail(err) {
                            tracing::debug!(task = task.name(), %reason, "task failed");
                            out.task_stage(task, from, TaskStage::Error);
                            out.emit_task(task, Event::new(EventKind::TaskFailed).with_reason(reason));
                        }
                    }
                }
            }
        }
        self.flush(out);
    }

    /// Ends the loop because nothing is left to run.
    ///
    /// Returns `false` if the loop must keep going: it was paused, or a task was added
    /// after the candidate snapshot was taken.
    pub(crate) fn close_empty(&self) -> bool {
        let mut out = Outbox::default();
        {
            let mut st = self.lock();
            match st.stage {
                DriverStage::Paused => return false,
                DriverStage::Stopping => self.close_stopped_locked(&mut st, &mut out),
                _ => {
                    if st.pool.values().any(|t| !t.stage().is_terminal()) {
                        return false;
                    }
                    st.exit = None;
                    self.transition(&mut st, DriverStage::Done, &mut out);
                    out.emit(Event::new(EventKind::Empty), Vec::new());
                }
            }
        }
        self.flush(out);
        true
    }

    /// Ends the loop after the exit command.
    pub(crate) fn close_stopped(&self) {
        let mut out = Outbox::default();
        {
            let mut st = self.lock();
            self.close_stopped_locked(&mut st, &mut out);
        }
        self.flush(out);
    }

    fn close_stopped_locked(&self, st: &mut State, out: &mut Outbox) {
        st.in_flight = None;
        st.exit = None;
        self.transition(st, DriverStage::Done, out);
        out.emit(Event::new(EventKind::Stopped), Vec::new());
    }

    /// Ends the loop because of a fault.
    pub(crate) fn crash(&self, err: DriverError) {
        tracing::error!(error = %err, label = err.as_label(), "driver loop crashed");
        let mut out = Outbox::default();
        {
            let mut st = self.lock();
            st.in_flight = None;
            st.exit = None;
            st.last_error = Some(err.clone());
            self.transition(&mut st, DriverStage::Error, &mut out);
            out.emit(
                Event::new(EventKind::Crashed).with_reason(err.to_string()),
                st.tasks(),
            );
        }
        self.flush(out);
    }
}

/// Marks a task dropped (when still live) and terminates its computation.
fn settle_drop(task: &Task, out: &mut Outbox) {
    match task.advance_stage(TaskStage::Dropped) {
        Some(from) => {
            tracing::debug!(task = task.name(), %from, "task dropped");
            out.task_stage(task, from, TaskStage::Dropped);
            out.effects.push(Effect::Terminate(task.clone()));
            out.emit_task(task, Event::new(EventKind::TaskDropped));
        }
        None => out.effects.push(Effect::Terminate(task.clone())),
    }
}
