use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::backend::{extract_row_count, BackendError, QueryBackend};
use crate::types::{DrainStop, ExecutionReport};

/// A drain loop that never reached a usable result. The descriptor keeps its
/// previous metrics and is retried on the next due pass.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    /// The backend failed on one of the calls. Rows counted by earlier calls
    /// are discarded.
    #[error("backend error after {elapsed_ms}ms: {source}")]
    Backend {
        elapsed_ms: u64,
        #[source]
        source: BackendError,
    },

    /// A single call exceeded the configured query timeout.
    #[error("backend call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, elapsed_ms: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorSettings {
    /// Stop draining after this many backend calls. `None` means unbounded.
    pub max_iterations: Option<u64>,
    /// Bound on a single backend call. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
}

/// Drives one query through repeated invocations until it reports no more
/// rows.
pub struct QueryExecutor {
    backend: Arc<dyn QueryBackend>,
    settings: ExecutorSettings,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn QueryBackend>, settings: ExecutorSettings) -> Self {
        Self { backend, settings }
    }

    /// Re-run `query` until it returns a count of zero, summing the counts.
    ///
    /// A result that carries no integer count ends the loop early and the
    /// rows accumulated so far are reported as a completed run. Backend
    /// errors and timeouts abort without a report.
    pub async fn run(&self, query: &str) -> Result<ExecutionReport, ExecutionFailure> {
        let started = Instant::now();
        let mut total_rows: i64 = 0;
        let mut iterations: u64 = 0;

        let stop = loop {
            if self
                .settings
                .max_iterations
                .is_some_and(|cap| iterations >= cap)
            {
                warn!(%query, iterations, total_rows, "drain loop hit iteration cap");
                break DrainStop::IterationCap;
            }

            let result = self.call(query, started).await?;
            iterations += 1;

            let processed = match extract_row_count(&result) {
                Ok(n) => n,
                Err(e) => {
                    error!(%query, backend = self.backend.name(), "query processing failed: {e}");
                    break DrainStop::MalformedResult;
                }
            };
            debug!(processed, iteration = iterations, "drain iteration");
            total_rows += processed;

            if processed <= 0 {
                break DrainStop::Exhausted;
            }
        };

        Ok(ExecutionReport {
            total_rows,
            elapsed_ms: elapsed_ms(started),
            iterations,
            stop,
        })
    }

    async fn call(
        &self,
        query: &str,
        started: Instant,
    ) -> Result<serde_json::Value, ExecutionFailure> {
        let outcome = match self.settings.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.backend.execute(query)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ExecutionFailure::Timeout {
                        timeout_ms: limit.as_millis() as u64,
                        elapsed_ms: elapsed_ms(started),
                    })
                }
            },
            None => self.backend.execute(query).await,
        };
        outcome.map_err(|source| ExecutionFailure::Backend {
            elapsed_ms: elapsed_ms(started),
            source,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Reply {
        Count(i64),
        Malformed,
        Down,
        Hang,
    }

    /// Backend that plays back a fixed script, then keeps returning zero.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _query: &str) -> Result<serde_json::Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front();
            match reply.unwrap_or(Reply::Count(0)) {
                Reply::Count(n) => Ok(json!({ "results": [{ "data": [{ "row": [n] }] }], "errors": [] })),
                Reply::Malformed => Ok(json!({ "results": [] })),
                Reply::Down => Err(BackendError::Unavailable("connection refused".into())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!({}))
                }
            }
        }
    }

    fn executor(backend: Arc<ScriptedBackend>, settings: ExecutorSettings) -> QueryExecutor {
        QueryExecutor::new(backend, settings)
    }

    #[tokio::test]
    async fn drains_until_zero() {
        let backend = ScriptedBackend::new(vec![Reply::Count(5), Reply::Count(3), Reply::Count(0)]);
        let report = executor(backend.clone(), ExecutorSettings::default())
            .run("MATCH (n) RETURN 1")
            .await
            .unwrap();
        assert_eq!(report.total_rows, 8);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.stop, DrainStop::Exhausted);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn malformed_result_keeps_partial_total() {
        let backend = ScriptedBackend::new(vec![Reply::Count(5), Reply::Malformed, Reply::Count(9)]);
        let report = executor(backend.clone(), ExecutorSettings::default())
            .run("q")
            .await
            .unwrap();
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.stop, DrainStop::MalformedResult);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn backend_error_is_a_failure() {
        let backend = ScriptedBackend::new(vec![Reply::Count(4), Reply::Down]);
        let err = executor(backend, ExecutorSettings::default())
            .run("q")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionFailure::Backend {
                source: BackendError::Unavailable(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn iteration_cap_stops_endless_query() {
        let backend = ScriptedBackend::new((0..10).map(|_| Reply::Count(1)).collect());
        let settings = ExecutorSettings {
            max_iterations: Some(4),
            query_timeout: None,
        };
        let report = executor(backend.clone(), settings).run("q").await.unwrap();
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.stop, DrainStop::IterationCap);
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn negative_count_ends_loop() {
        let backend = ScriptedBackend::new(vec![Reply::Count(2), Reply::Count(-1), Reply::Count(7)]);
        let report = executor(backend.clone(), ExecutorSettings::default())
            .run("q")
            .await
            .unwrap();
        assert_eq!(report.total_rows, 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn hung_backend_times_out() {
        let backend = ScriptedBackend::new(vec![Reply::Count(2), Reply::Hang]);
        let settings = ExecutorSettings {
            max_iterations: None,
            query_timeout: Some(Duration::from_millis(50)),
        };
        let err = executor(backend, settings).run("q").await.unwrap_err();
        match err {
            ExecutionFailure::Timeout { timeout_ms, .. } => assert_eq!(timeout_ms, 50),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
