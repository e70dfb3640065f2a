//! # The scheduling loop.
//!
//! One loop task per started driver. Every iteration:
//!
//! ```text
//!   cadence gate ──► paused? ──► policy.should_run ──► candidates ──► pick ──► step
//!        ▲              │               │                   │                   │
//!        │          wait resume       idle               empty:               ▼
//!        │          or exit                              Done + Empty      commit
//!        └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Step
//! 1. claim the task (stage `Running`, register the in-flight skip token)
//! 2. advance the computation once with its last exchange value, add the time to runtime
//! 3. normalize the produced value and wait for it
//! 4. commit: `Yield` stores the exchange value, calls the callback and emits `Yield`;
//!    completion emits `TaskDone`; any failure emits `TaskFailed`
//!
//! ## Rules
//! - Both suspension points (gate, value wait) race the exit token.
//! - Injected commands are consulted before the outcome is looked at, so a dropped
//!   task never reports `TaskDone` or `TaskFailed`.
//! - Task failures never escape a step, panics inside a pending value included.
//!   Anything else that goes wrong (a cadence that drops its continuation, a panicking
//!   callback) crashes the loop: stage `Error`, `Crashed` event, error kept for `join()`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, TaskError, panic_message};
use crate::tasks::{Task, Yielded, measure, normalize};

use super::DriverStage;
use super::select;
use super::shared::{Command, Flow, Outcome, Shared};

/// Loop entry point; turns every fault into a crash.
pub(crate) async fn run(shared: Arc<Shared>, exit: CancellationToken) {
    let res = AssertUnwindSafe(drive(&shared, &exit)).catch_unwind().await;
    let fault = match res {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(payload) => DriverError::LoopPanicked {
            info: panic_message(payload.as_ref()),
        },
    };
    shared.crash(fault);
}

async fn drive(shared: &Shared, exit: &CancellationToken) -> Result<(), DriverError> {
    let mut stage = shared.watch();
    loop {
        if gate(shared, exit).await? == Flow::Exit {
            shared.close_stopped();
            return Ok(());
        }

        if shared.stage() == DriverStage::Paused {
            tokio::select! {
                biased;
                _ = exit.cancelled() => {}
                _ = stage.wait_for(|s| *s != DriverStage::Paused) => {}
            }
            continue;
        }

        if !shared.policy.should_run() {
            idle(shared).await;
            continue;
        }

        let candidates = shared.lock().unfinished();
        if candidates.is_empty() {
            if shared.close_empty() {
                return Ok(());
            }
            continue;
        }

        let eligible: Vec<Task> = candidates
            .into_iter()
            .filter(|t| shared.policy.should_task_run(t))
            .collect();
        let Some(task) = select::pick(&eligible).cloned() else {
            idle(shared).await;
            continue;
        };

        if step(shared, exit, task).await? == Flow::Exit {
            shared.close_stopped();
            return Ok(());
        }
    }
}

/// Waits for the cadence to allow the next iteration.
async fn gate(shared: &Shared, exit: &CancellationToken) -> Result<Flow, DriverError> {
    let (tx, rx) = oneshot::channel::<()>();
    let handle = shared.cadence.schedule(Box::new(move || {
        let _ = tx.send(());
    }));
    tokio::select! {
        biased;
        _ = exit.cancelled() => {
            handle.cancel();
            Ok(Flow::Exit)
        }
        fired = rx => match fired {
            Ok(()) => Ok(Flow::after(exit)),
            Err(_) => Err(DriverError::CadenceClosed),
        },
    }
}

async fn idle(shared: &Shared) {
    if shared.cfg.yield_when_idle {
        tokio::task::yield_now().await;
    }
}

fn command(skip: &CancellationToken, exit: &CancellationToken) -> Option<Command> {
    if skip.is_cancelled() {
        Some(Command::Skip)
    } else if exit.is_cancelled() {
        Some(Command::Exit)
    } else {
        None
    }
}

/// Waits for a produced value; a panic while resolving it fails the task.
async fn resolve(produced: Yielded) -> Result<Value, TaskError> {
    match AssertUnwindSafe(normalize(produced)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(TaskError::Panicked {
            info: panic_message(payload.as_ref()),
        }),
    }
}

async fn step(shared: &Shared, exit: &CancellationToken, task: Task) -> Result<Flow, DriverError> {
    let Some(skip) = shared.begin_step(&task)? else {
        return Ok(Flow::Continue);
    };

    let input = task.exchange();
    let (advanced, took) = measure(|| task.advance(input));
    task.add_runtime(took);

    if let Some(cmd) = command(&skip, exit) {
        shared.abandon(&task, cmd);
        return Ok(Flow::after(exit));
    }

    let (produced, finished) = match advanced {
        Ok(step) => step.into_parts(),
        Err(err) => {
            shared.commit(&task, &skip, Outcome::Failed(err));
            return Ok(Flow::after(exit));
        }
    };

    let resolved = tokio::select! {
        biased;
        _ = exit.cancelled() => None,
        _ = skip.cancelled() => None,
        res = resolve(produced) => Some(res),
    };

    if let Some(cmd) = command(&skip, exit) {
        shared.abandon(&task, cmd);
        return Ok(Flow::after(exit));
    }
    let Some(resolved) = resolved else {
        return Err(DriverError::Invariant {
            detail: format!("value wait of `{}` ended without a command", task.name()),
        });
    };

    let outcome = match resolved {
        Ok(value) if finished => Outcome::Completed(value),
        Ok(value) => Outcome::Yielded(value),
        Err(err) => Outcome::Failed(err),
    };
    shared.commit(&task, &skip, outcome);
    Ok(Flow::after(exit))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::cadence::{Cadence, CancelHandle, Continuation, Immediate};
    use crate::core::{Driver, DriverConfig};
    use crate::error::TaskError;
    use crate::events::{Event, EventKind};
    use crate::tasks::{Serial, Step, TaskStage, Yielded, from_fn, from_iter};

    fn render(e: &Event) -> String {
        let label = e.kind.as_label();
        match (&e.task, &e.value) {
            (Some(task), Some(value)) => format!("{label}:{task}:{value}"),
            (Some(task), None) => format!("{label}:{task}"),
            _ => label.to_string(),
        }
    }

    fn record(driver: &Driver, kinds: &[EventKind]) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for &kind in kinds {
            let log = Arc::clone(&log);
            driver.on(kind, move |e| log.lock().unwrap().push(render(e)));
        }
        log
    }

    fn task(name: &'static str, priority: i64, items: Vec<Yielded>) -> Task {
        Task::builder(from_iter(items))
            .name(name)
            .priority(priority)
            .build()
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached in time");
    }

    const STEP_EVENTS: &[EventKind] = &[
        EventKind::Start,
        EventKind::Yield,
        EventKind::TaskDone,
        EventKind::TaskFailed,
        EventKind::TaskDropped,
        EventKind::Empty,
        EventKind::Crashed,
    ];

    #[tokio::test]
    async fn test_higher_priority_runs_to_completion_first() {
        let a = task("a", 1, vec!["a".into()]);
        let b = task("b", 2, vec!["b".into()]);
        let driver = Driver::new([a, b]).unwrap();
        let log = record(&driver, STEP_EVENTS);

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "start",
                r#"yield:b:"b""#,
                "task-done:b:null",
                r#"yield:a:"a""#,
                "task-done:a:null",
                "empty",
            ]
        );
        assert_eq!(driver.stage(), DriverStage::Done);
        assert!(driver.unfinished_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_equal_priority_prefers_less_runtime() {
        // every step of `heavy` burns far more time than all of `light`
        let heavy = Task::named(
            "heavy",
            from_fn({
                let mut n = 0;
                move |_| {
                    std::thread::sleep(Duration::from_millis(20));
                    n += 1;
                    Ok(if n < 2 {
                        Step::yield_value(json!(n))
                    } else {
                        Step::complete(())
                    })
                }
            }),
        );
        let light = Task::named("light", from_iter([1, 2]));
        let driver = Driver::builder(DriverConfig::default())
            .with_cadence(Immediate)
            .with_tasks([heavy, light])
            .build()
            .unwrap();
        let log = record(&driver, &[EventKind::Yield, EventKind::TaskDone]);

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "yield:heavy:1",
                "yield:light:1",
                "yield:light:2",
                "task-done:light:null",
                "task-done:heavy:null",
            ]
        );
    }

    #[tokio::test]
    async fn test_priority_change_applies_next_round() {
        let a = task("a", 1, vec![1.into(), 2.into()]);
        let b = task("b", 0, vec![10.into()]);
        let driver = Driver::new([a, b.clone()]).unwrap();
        let log = record(&driver, &[EventKind::Yield, EventKind::TaskDone]);

        driver.once(EventKind::Yield, move |_| b.set_priority(5));
        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "yield:a:1",
                "yield:b:10",
                "task-done:b:null",
                "yield:a:2",
                "task-done:a:null",
            ]
        );
    }

    #[tokio::test]
    async fn test_resolved_value_is_sent_back() {
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&inputs);
        let mut n = 0;
        let echo = Task::named(
            "echo",
            from_fn(move |input: Value| {
                seen.lock().unwrap().push(input);
                n += 1;
                Ok(match n {
                    1 => Step::yield_value(json!("sync")),
                    2 => Step::yield_value(Yielded::future(async { Ok(json!("async")) })),
                    _ => Step::complete(()),
                })
            }),
        );
        let driver = Driver::new([echo.clone()]).unwrap();

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *inputs.lock().unwrap(),
            [Value::Null, json!("sync"), json!("async")]
        );
        assert_eq!(echo.exchange(), json!("async"));
        assert_eq!(echo.stage(), TaskStage::Done);
    }

    #[tokio::test]
    async fn test_callback_sees_every_value_in_order() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let nested = Yielded::all([
            Yielded::value(1),
            Yielded::future(async { Ok(json!(2)) }),
            Yielded::all([Yielded::null(), Yielded::value(json!({"k": 3}))]),
        ]);
        let driver = Driver::builder(DriverConfig::default())
            .with_callback(move |v| sink.lock().unwrap().push(v.clone()))
            .with_tasks([task("t", 0, vec!["first".into(), nested])])
            .build()
            .unwrap();

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *values.lock().unwrap(),
            [json!("first"), json!([1, 2, [null, {"k": 3}]])]
        );
    }

    #[tokio::test]
    async fn test_rejected_value_fails_only_that_task() {
        let bad = task(
            "bad",
            1,
            vec![Yielded::future(async { Err(TaskError::rejected("boom")) })],
        );
        let good = task("good", 0, vec!["ok".into()]);
        let driver = Driver::new([bad.clone(), good.clone()]).unwrap();
        let log = record(&driver, STEP_EVENTS);

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "start",
                "task-failed:bad",
                r#"yield:good:"ok""#,
                "task-done:good:null",
                "empty",
            ]
        );
        assert_eq!(bad.stage(), TaskStage::Error);
        assert_eq!(bad.error(), Some(TaskError::rejected("boom")));
        assert_eq!(good.stage(), TaskStage::Done);
        assert!(driver.last_error().is_none());
    }

    async fn explode() -> Result<Value, TaskError> {
        panic!("async boom")
    }

    #[tokio::test]
    async fn test_panicking_value_fails_only_that_task() {
        let bad = task(
            "bad",
            1,
            vec![Yielded::future(explode())],
        );
        let good = task("good", 0, vec!["ok".into()]);
        let driver = Driver::new([bad.clone(), good.clone()]).unwrap();
        let log = record(&driver, STEP_EVENTS);

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "start",
                "task-failed:bad",
                r#"yield:good:"ok""#,
                "task-done:good:null",
                "empty",
            ]
        );
        assert_eq!(bad.stage(), TaskStage::Error);
        assert_eq!(
            bad.error(),
            Some(TaskError::Panicked {
                info: "async boom".into()
            })
        );
        assert_eq!(good.stage(), TaskStage::Done);
        assert_eq!(driver.stage(), DriverStage::Done);
        assert!(driver.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failures_from_advance_are_task_errors() {
        let failing = Task::named("failing", from_fn(|_| Err(TaskError::fail("nope"))));
        let panicking = Task::named("panicking", from_fn(|_| panic!("kaboom")));
        let driver = Driver::new([failing.clone(), panicking.clone()]).unwrap();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        driver.on(EventKind::TaskFailed, move |e| {
            sink.lock().unwrap().push(e.reason.as_deref().unwrap_or("").to_string());
        });

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *reasons.lock().unwrap(),
            ["execution failed: nope", "computation panicked: kaboom"]
        );
        assert_eq!(failing.stage(), TaskStage::Error);
        assert!(matches!(panicking.error(), Some(TaskError::Panicked { .. })));
        assert_eq!(driver.stage(), DriverStage::Done);
    }

    #[tokio::test]
    async fn test_drop_in_flight_discards_value() {
        let entered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&entered);
        let slow = Task::named(
            "slow",
            from_fn(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(Step::complete(Yielded::future(async {
                    std::future::pending::<()>().await;
                    Ok(json!("never"))
                })))
            }),
        );
        let driver = Driver::new([slow.clone()]).unwrap();
        let log = record(&driver, STEP_EVENTS);
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        slow.on(EventKind::TaskStageChanged, move |e| {
            sink.lock().unwrap().push(e.task_stage);
        });

        driver.start().unwrap();
        until(|| entered.load(Ordering::SeqCst)).await;
        driver.drop_tasks(&[slow.clone()]);
        driver.join().await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["start", "task-dropped:slow", "empty"]);
        assert_eq!(
            *stages.lock().unwrap(),
            [
                Some((TaskStage::Init, TaskStage::Running)),
                Some((TaskStage::Running, TaskStage::Dropped)),
            ]
        );
        assert!(slow.is_terminated());
        assert!(driver.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_drop_waiting_task_marks_dropped() {
        let a = task("a", 1, vec![1.into(), 2.into()]);
        let b = task("b", 0, vec![1.into()]);
        let driver = Driver::new([a.clone(), b.clone()]).unwrap();
        let log = record(&driver, STEP_EVENTS);

        // `b` was never advanced: it goes straight from init to dropped
        let victim = b.clone();
        let handle = driver.clone();
        driver.once(EventKind::Yield, move |_| handle.drop_tasks(&[victim.clone()]));
        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "start",
                "yield:a:1",
                "task-dropped:b",
                "yield:a:2",
                "task-done:a:null",
                "empty",
            ]
        );
        assert_eq!(b.stage(), TaskStage::Dropped);
        assert!(b.is_terminated());
    }

    #[tokio::test]
    async fn test_serial_runs_parts_in_turn() {
        let serial = Serial::new(Vec::new())
            .then(from_iter(["a1", "a2"]))
            .then(from_iter(["b1"]));
        let driver = Driver::new([Task::named("serial", serial)]).unwrap();
        let log = record(&driver, &[EventKind::Yield, EventKind::TaskDone]);

        driver.start().unwrap();
        driver.join().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                r#"yield:serial:"a1""#,
                r#"yield:serial:"a2""#,
                r#"yield:serial:"b1""#,
                "task-done:serial:null",
            ]
        );
    }

    #[tokio::test]
    async fn test_ineligible_tasks_wait() {
        let blocked = Arc::new(AtomicBool::new(true));
        let gate = Arc::clone(&blocked);
        let driver = Driver::builder(DriverConfig::default())
            .with_policy(crate::core::TaskFilter::new(move |t: &Task| {
                t.name() != "held" || !gate.load(Ordering::SeqCst)
            }))
            .with_tasks([task("free", 0, vec![1.into()]), task("held", 9, vec![2.into()])])
            .build()
            .unwrap();
        let log = record(&driver, &[EventKind::TaskDone]);

        driver.start().unwrap();
        until(|| log.lock().unwrap().len() == 1).await;
        assert_eq!(driver.task("held").unwrap().stage(), TaskStage::Init);
        assert!(driver.is_running());

        blocked.store(false, Ordering::SeqCst);
        driver.join().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["task-done:free:null", "task-done:held:null"]
        );
    }

    #[tokio::test]
    async fn test_run_veto_idles_the_loop() {
        struct Switch(Arc<AtomicBool>);
        impl crate::core::RunPolicy for Switch {
            fn should_run(&self) -> bool {
                self.0.load(Ordering::SeqCst)
            }
        }

        let on = Arc::new(AtomicBool::new(false));
        let t = task("t", 0, vec![1.into()]);
        let driver = Driver::builder(DriverConfig::default())
            .with_policy(Switch(Arc::clone(&on)))
            .with_tasks([t.clone()])
            .build()
            .unwrap();

        driver.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(t.stage(), TaskStage::Init);

        on.store(true, Ordering::SeqCst);
        driver.join().await.unwrap();
        assert_eq!(t.stage(), TaskStage::Done);
    }

    struct Forgetful;

    impl Cadence for Forgetful {
        fn schedule(&self, continuation: Continuation) -> CancelHandle {
            drop(continuation);
            CancelHandle::noop()
        }
    }

    #[tokio::test]
    async fn test_cadence_fault_crashes_the_loop() {
        let t = task("t", 0, vec![1.into()]);
        let driver = Driver::builder(DriverConfig::default())
            .with_cadence(Forgetful)
            .with_tasks([t.clone()])
            .build()
            .unwrap();
        let log = record(&driver, STEP_EVENTS);
        let crashed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&crashed);
        t.on(EventKind::Crashed, move |_| flag.store(true, Ordering::SeqCst));

        driver.start().unwrap();
        assert_eq!(driver.join().await, Err(DriverError::CadenceClosed));

        assert_eq!(*log.lock().unwrap(), ["start", "crashed"]);
        assert!(crashed.load(Ordering::SeqCst));
        assert_eq!(driver.stage(), DriverStage::Error);
        assert_eq!(driver.last_error(), Some(DriverError::CadenceClosed));
        assert_eq!(t.stage(), TaskStage::Init);
    }

    #[tokio::test]
    async fn test_callback_panic_crashes_the_loop() {
        let driver = Driver::builder(DriverConfig::default())
            .with_callback(|_| panic!("host bug"))
            .with_tasks([task("t", 0, vec![1.into()])])
            .build()
            .unwrap();

        driver.start().unwrap();
        let err = driver.join().await.unwrap_err();

        assert_eq!(
            err,
            DriverError::LoopPanicked {
                info: "host bug".into()
            }
        );
        assert_eq!(driver.stage(), DriverStage::Error);

        // a crashed driver can still be stopped
        driver.stop().await.unwrap();
        assert_eq!(driver.stage(), DriverStage::Done);
        assert!(driver.tasks().is_empty());
    }
}
