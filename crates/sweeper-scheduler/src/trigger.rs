use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::runner::JobRunner;

/// Run a pass over `dir` every `every` until `shutdown` broadcasts `true`.
///
/// The first pass starts immediately. Passes never overlap: a pass that runs
/// longer than `every` delays the next tick instead of stacking up. Shutdown
/// is only observed between passes.
pub async fn run_periodic(
    runner: JobRunner,
    dir: PathBuf,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(dir = %dir.display(), every_secs = every.as_secs(), "trigger started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = runner.process_all(&dir).await {
                    error!("pass failed: {e}");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("trigger shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, QueryBackend};
    use crate::runner::RunnerSettings;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl QueryBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self, _query: &str) -> Result<serde_json::Value, BackendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "results": [{ "data": [{ "row": [0] }] }] }))
        }
    }

    #[tokio::test]
    async fn runs_a_pass_then_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vector.json"),
            r#"[{"queryName":"q","cypherQuery":"RETURN 0","runSchedule":0}]"#,
        )
        .unwrap();

        let backend = Arc::new(Counting(AtomicUsize::new(0)));
        let runner = JobRunner::new(backend.clone(), RunnerSettings::default());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_periodic(
            runner,
            dir.path().to_path_buf(),
            Duration::from_secs(3600),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
        let raw = std::fs::read_to_string(dir.path().join("vector.json")).unwrap();
        assert!(raw.contains("lastExecutionTime"));
    }

    #[tokio::test]
    async fn missing_directory_does_not_stop_the_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(
            Arc::new(Counting(AtomicUsize::new(0))),
            RunnerSettings::default(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_periodic(
            runner,
            dir.path().join("missing"),
            Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
