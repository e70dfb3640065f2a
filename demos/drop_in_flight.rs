//! # Example: drop_in_flight
//!
//! Dropping a task while the loop waits for its asynchronous value.
//!
//! The `poll` task yields a value that takes seconds to resolve. It is dropped after
//! 100ms: the loop wakes up, discards the value, marks the task dropped and moves on
//! to `tick`. No `task-done` is ever printed for `poll`.
//!
//! ## Run
//! ```bash
//! cargo run --example drop_in_flight --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskdriver::{Deferred, Driver, DriverConfig, LogWriter, Subscribe, Task, Yielded, from_iter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let driver = Driver::builder(DriverConfig::default())
        .with_cadence(Deferred::new(Duration::from_millis(20)))
        .with_subscribers(subs)
        .build()?;

    let poll = Task::builder(from_iter([Yielded::future(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!("too late"))
    })]))
    .name("poll")
    .priority(1)
    .build();
    let tick = Task::named("tick", from_iter([1, 2, 3]));

    driver.add_task(poll.clone())?;
    driver.add_task(tick)?;
    driver.start()?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    driver.drop_tasks(&[poll.clone()]);

    driver.join().await?;
    println!("poll ended as {}", poll.stage());

    // flush the log subscriber
    driver.dispose().await?;
    Ok(())
}
