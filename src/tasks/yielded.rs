//! # Produced values and their normalization.
//!
//! A computation step produces a [`Yielded`]: either a concrete [`Value`], a pending
//! future of one, or an ordered collection of further `Yielded` items (which may nest).
//! The driver turns every produced value into a single future with [`normalize`]
//! before feeding the resolved value back into the task.
//!
//! ```text
//! Ready(v)          ──► v
//! Pending(fut)      ──► fut.await
//! All([a, b, ...])  ──► [normalize(a), normalize(b), ...]   (order kept, first error wins)
//! ```

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;

use crate::error::TaskError;

/// Value produced by one computation step.
pub enum Yielded {
    /// Already-concrete value, passed through unchanged.
    Ready(Value),
    /// Asynchronous value; its error becomes a task failure.
    Pending(BoxFuture<'static, Result<Value, TaskError>>),
    /// Ordered collection resolved element by element into a JSON array.
    All(Vec<Yielded>),
}

impl Yielded {
    /// Concrete value.
    pub fn value(v: impl Into<Value>) -> Self {
        Yielded::Ready(v.into())
    }

    /// `null`.
    pub fn null() -> Self {
        Yielded::Ready(Value::Null)
    }

    /// Asynchronous value.
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Yielded::Pending(fut.boxed())
    }

    /// Ordered collection of produced values.
    pub fn all(items: impl IntoIterator<Item = Yielded>) -> Self {
        Yielded::All(items.into_iter().collect())
    }

    /// True if resolving this value needs no suspension.
    pub fn is_ready(&self) -> bool {
        match self {
            Yielded::Ready(_) => true,
            Yielded::Pending(_) => false,
            Yielded::All(items) => items.iter().all(Yielded::is_ready),
        }
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yielded::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Yielded::Pending(_) => f.write_str("Pending(..)"),
            Yielded::All(items) => f.debug_tuple("All").field(items).finish(),
        }
    }
}

impl From<Value> for Yielded {
    fn from(v: Value) -> Self {
        Yielded::Ready(v)
    }
}

impl From<&str> for Yielded {
    fn from(v: &str) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<String> for Yielded {
    fn from(v: String) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<i64> for Yielded {
    fn from(v: i64) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<i32> for Yielded {
    fn from(v: i32) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<u64> for Yielded {
    fn from(v: u64) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<f64> for Yielded {
    fn from(v: f64) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<bool> for Yielded {
    fn from(v: bool) -> Self {
        Yielded::Ready(Value::from(v))
    }
}

impl From<()> for Yielded {
    fn from(_: ()) -> Self {
        Yielded::Ready(Value::Null)
    }
}

impl From<Vec<Yielded>> for Yielded {
    fn from(items: Vec<Yielded>) -> Self {
        Yielded::All(items)
    }
}

/// Turns a produced value into one future of a concrete value.
pub fn normalize(yielded: Yielded) -> BoxFuture<'static, Result<Value, TaskError>> {
    match yielded {
        Yielded::Ready(v) => futures::future::ready(Ok(v)).boxed(),
        Yielded::Pending(fut) => fut,
        Yielded::All(items) => {
            let parts: Vec<_> = items.into_iter().map(normalize).collect();
            async move { try_join_all(parts).await.map(Value::Array) }.boxed()
        }
    }
}

/// Runs `f` and returns its result with the wall-clock time it took.
pub fn measure<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let started = Instant::now();
    let out = f();
    (out, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ready_passes_through() {
        assert_eq!(normalize(Yielded::from("a")).await, Ok(json!("a")));
        assert_eq!(normalize(Yielded::null()).await, Ok(Value::Null));
        assert_eq!(
            normalize(Yielded::value(json!({"c": "c"}))).await,
            Ok(json!({"c": "c"}))
        );
    }

    #[tokio::test]
    async fn pending_is_awaited() {
        let y = Yielded::future(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(json!("b"))
        });
        assert!(!y.is_ready());
        assert_eq!(normalize(y).await, Ok(json!("b")));
    }

    #[tokio::test]
    async fn nested_collections_keep_structure_and_order() {
        let y = Yielded::all([
            Yielded::from(1i64),
            Yielded::future(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(json!("1.1"))
            }),
            Yielded::all([Yielded::from("x"), Yielded::future(async { Ok(json!(2)) })]),
        ]);
        assert_eq!(normalize(y).await, Ok(json!([1, "1.1", ["x", 2]])));
    }

    #[tokio::test]
    async fn collection_fails_on_first_rejection() {
        let y = Yielded::all([
            Yielded::from(1i64),
            Yielded::future(async { Err(TaskError::rejected("nope")) }),
        ]);
        assert_eq!(normalize(y).await, Err(TaskError::rejected("nope")));
    }

    #[test]
    fn measure_reports_elapsed() {
        let (v, took) = measure(|| {
            std::thread::sleep(Duration::from_millis(2));
            7
        });
        assert_eq!(v, 7);
        assert!(took >= Duration::from_millis(2));
    }
}
