use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sweeper_core::SweeperConfig;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    backend::QueryBackend,
    descriptor::{is_auxiliary, DescriptorFile},
    error::{JobError, Result},
    executor::{ExecutorSettings, QueryExecutor},
    schedule::{format_execution_time, is_due, parse_execution_time, TimestampError},
    types::{JobDescriptor, PassSummary},
};

/// Everything a [`JobRunner`] needs besides the backend, passed in explicitly.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub executor: ExecutorSettings,
    /// Zone in which `lastExecutionTime` values are read and written.
    pub timezone: Tz,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            executor: ExecutorSettings::default(),
            timezone: Tz::UTC,
        }
    }
}

impl RunnerSettings {
    pub fn from_config(config: &SweeperConfig) -> sweeper_core::Result<Self> {
        let jobs = &config.jobs;
        Ok(Self {
            executor: ExecutorSettings {
                max_iterations: (jobs.max_iterations > 0).then_some(jobs.max_iterations),
                query_timeout: (jobs.query_timeout_secs > 0)
                    .then(|| Duration::from_secs(jobs.query_timeout_secs)),
            },
            timezone: config.timezone()?,
        })
    }
}

/// Due state of one descriptor, as reported by [`JobRunner::plan_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub query_name: String,
    /// `None` when the stored execution time cannot be read.
    pub due: Option<bool>,
}

#[derive(Debug)]
pub struct FilePlan {
    pub path: PathBuf,
    /// Error text when the file cannot be read or parsed.
    pub entries: std::result::Result<Vec<PlanEntry>, String>,
}

/// Runs every due descriptor in a directory and folds results back into the
/// descriptor files.
pub struct JobRunner {
    executor: QueryExecutor,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(backend: Arc<dyn QueryBackend>, settings: RunnerSettings) -> Self {
        Self {
            executor: QueryExecutor::new(backend, settings.executor.clone()),
            settings,
        }
    }

    /// One pass over `dir` at the current wall-clock time.
    pub async fn process_all(&self, dir: &Path) -> Result<PassSummary> {
        self.process_all_at(dir, Utc::now()).await
    }

    /// One pass over `dir`, treating `now` as the current time.
    ///
    /// Only an unreadable directory fails the pass. Problems with a single
    /// file or descriptor are logged and the pass moves on.
    pub async fn process_all_at(&self, dir: &Path, now: DateTime<Utc>) -> Result<PassSummary> {
        let pass_id = Uuid::new_v4();
        let span = info_span!("pass", %pass_id);
        async move {
            let files = list_descriptor_files(dir)?;
            info!(dir = %dir.display(), files = files.len(), "pass started");

            let mut summary = PassSummary::default();
            for path in files {
                summary.files_seen += 1;
                let file_span = info_span!("file", file = %path.display());
                self.process_file(&path, now, pass_id, &mut summary)
                    .instrument(file_span)
                    .await;
            }

            info!(
                files_written = summary.files_written,
                files_skipped = summary.files_skipped,
                executed = summary.executed,
                failed = summary.failed,
                not_due = summary.not_due,
                bad_timestamps = summary.bad_timestamps,
                "pass finished"
            );
            Ok::<_, JobError>(summary)
        }
        .instrument(span)
        .await
    }

    /// Report which descriptors are due at `now` without running anything.
    pub fn plan_at(&self, dir: &Path, now: DateTime<Utc>) -> Result<Vec<FilePlan>> {
        let plans = list_descriptor_files(dir)?
            .into_iter()
            .map(|path| {
                let entries = DescriptorFile::new(&path)
                    .read()
                    .map(|descriptors| {
                        descriptors
                            .iter()
                            .map(|d| PlanEntry {
                                query_name: d.query_name.clone(),
                                due: self.due(d, now).ok(),
                            })
                            .collect()
                    })
                    .map_err(|e| e.to_string());
                FilePlan { path, entries }
            })
            .collect();
        Ok(plans)
    }

    async fn process_file(
        &self,
        path: &Path,
        now: DateTime<Utc>,
        pass_id: Uuid,
        summary: &mut PassSummary,
    ) {
        let file = DescriptorFile::new(path);
        let holder = format!("pass={pass_id} pid={}", std::process::id());
        // Only a lock held by another pass skips the file. If the lock itself
        // cannot be taken (read-only directory and the like) the queries still run.
        let _lock = match file.lock(&holder) {
            Ok(lock) => Some(lock),
            Err(e @ JobError::Locked { .. }) => {
                warn!("skipping descriptor file: {e}");
                summary.files_skipped += 1;
                return;
            }
            Err(e) => {
                warn!("proceeding without lock: {e}");
                None
            }
        };

        let descriptors = match file.read() {
            Ok(d) => d,
            Err(e) => {
                error!("skipping descriptor file: {e}");
                summary.files_skipped += 1;
                return;
            }
        };

        let mut updated = Vec::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            self.process_descriptor(&mut descriptor, now, summary).await;
            updated.push(descriptor);
        }

        match file.write(&updated) {
            Ok(()) => summary.files_written += 1,
            Err(e) => {
                error!("descriptor updates lost for this pass: {e}");
                summary.files_skipped += 1;
            }
        }
    }

    async fn process_descriptor(
        &self,
        descriptor: &mut JobDescriptor,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) {
        let due = match self.due(descriptor, now) {
            Ok(due) => due,
            Err(e) => {
                error!(
                    query = %descriptor.query_name,
                    "cannot read lastExecutionTime, leaving descriptor unchanged: {e}"
                );
                summary.bad_timestamps += 1;
                return;
            }
        };
        if !due {
            summary.not_due += 1;
            return;
        }

        let span = info_span!("descriptor", query = %descriptor.query_name);
        match self
            .executor
            .run(&descriptor.query_text)
            .instrument(span)
            .await
        {
            Ok(report) => {
                info!(
                    query = %descriptor.query_name,
                    records = report.total_rows,
                    elapsed_ms = report.elapsed_ms,
                    iterations = report.iterations,
                    stop = %report.stop,
                    "query executed"
                );
                descriptor.record_run(format_execution_time(now, self.settings.timezone), &report);
                summary.executed += 1;
            }
            Err(e) => {
                error!(
                    query = %descriptor.query_name,
                    cypher = %descriptor.query_text,
                    "query processing failed: {e}"
                );
                summary.failed += 1;
            }
        }
    }

    fn due(
        &self,
        descriptor: &JobDescriptor,
        now: DateTime<Utc>,
    ) -> std::result::Result<bool, TimestampError> {
        let last_run = descriptor
            .last_execution_time
            .as_deref()
            .map(|t| parse_execution_time(t, self.settings.timezone))
            .transpose()?;
        Ok(is_due(descriptor.interval_minutes, last_run, now))
    }
}

/// Regular files in `dir`, sorted by name. Subdirectories and lock/scratch
/// files are left out.
pub fn list_descriptor_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| JobError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(dir = %dir.display(), "unreadable directory entry: {e}");
                None
            }
        })
        .filter(|path| path.is_file() && !is_auxiliary(path))
        .collect();
    files.sort();
    Ok(files)
}
