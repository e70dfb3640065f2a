//! # Example: basic_driver
//!
//! Two tasks with different priorities sharing one driver loop.
//!
//! Demonstrates how to:
//! - Build a [`Driver`] with a per-value callback.
//! - Write a computation by hand and from an iterator.
//! - Yield concrete, asynchronous and collected values.
//! - Bump a priority while the loop is running.
//!
//! ## Flow
//! ```text
//! start()
//!   ├─► Start
//!   ├─► crawl (prio 2): page 1, page 2 (async), [a, b] (collection)
//!   │     └─► on first page: report.set_priority(5)
//!   ├─► report (prio 5 now): runs to completion
//!   ├─► crawl finishes
//!   └─► Empty ──► join() returns
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example basic_driver
//! ```

use std::time::Duration;

use serde_json::{Value, json};
use taskdriver::{
    Computation, Driver, DriverConfig, EventKind, Step, Task, TaskError, Yielded, from_iter,
};

/// Hand-written computation: fetches three "pages", feeding each result back in.
struct Crawl {
    page: u32,
}

impl Computation for Crawl {
    fn advance(&mut self, input: Value) -> Result<Step, TaskError> {
        self.page += 1;
        println!("[crawl] step {} got {input}", self.page);
        Ok(match self.page {
            1 => Step::yield_value(json!({"page": 1})),
            2 => Step::yield_value(Yielded::future(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!({"page": 2}))
            })),
            3 => Step::yield_value(Yielded::all([
                Yielded::value("a"),
                Yielded::future(async { Ok(json!("b")) }),
            ])),
            _ => Step::complete("crawled"),
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Driver with a callback for every yielded value
    let driver = Driver::builder(DriverConfig::default())
        .with_callback(|v| println!("[callback] {v}"))
        .build()?;

    // 2. Tasks: a hand-written computation and an iterator
    let crawl = Task::builder(Crawl { page: 0 })
        .name("crawl")
        .priority(2)
        .build();
    let report = Task::builder(from_iter(["summary", "totals"]))
        .name("report")
        .priority(1)
        .build();
    driver.add_task(crawl)?;
    driver.add_task(report.clone())?;

    // 3. Raise `report` above `crawl` after the first value
    driver.once(EventKind::Yield, move |_| report.set_priority(5));
    driver.on(EventKind::TaskDone, |e| {
        println!("[done] {} -> {:?}", e.task.as_deref().unwrap_or("-"), e.value);
    });
    driver.on(EventKind::Empty, |_| println!("[driver] pool is empty"));

    // 4. Run until the pool is empty
    driver.start()?;
    driver.join().await?;
    Ok(())
}
