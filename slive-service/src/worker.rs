//! The per-task loop driving an [`Executor`] through a fixed number of operations.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use slive_types::MetricRecord;
use tokio::sync::mpsc;

use crate::backend::SharedBackend;
use crate::catalog::{MissingReadPolicy, OperationCatalog};
use crate::error::{SinkError, WorkerError};
use crate::executor::{Executor, ExecutorConfig};

/// Number of completed operations between two progress reports.
pub const PROGRESS_INTERVAL: u64 = 100;

/// How a worker invokes its executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run one operation at a time, in order.
    Sequential,
    /// Schedule all operations on the executor's pool and collect records as they finish.
    #[default]
    Concurrent,
}

impl ExecutionMode {
    /// The lowercase name used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`ExecutionMode`].
#[derive(Debug, thiserror::Error)]
#[error("unknown execution mode `{0}`, expected `sequential` or `concurrent`")]
pub struct ModeParseError(String);

impl FromStr for ExecutionMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("sequential") => Ok(Self::Sequential),
            s if s.eq_ignore_ascii_case("concurrent") => Ok(Self::Concurrent),
            s => Err(ModeParseError(s.to_owned())),
        }
    }
}

/// Settings of a single [`Worker`].
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Identifier of this worker.
    pub task_id: u32,
    /// Operation names cycled through in order. Repeating a name increases its share.
    pub operations: Vec<String>,
    /// Total number of operations to run.
    pub ops_per_worker: u64,
    /// Directory under which all operation paths are derived.
    pub base_dir: String,
    /// Size of files created by `write`, in mebibytes.
    pub file_size_mb: u64,
    /// Maximum number of concurrently running operations in concurrent mode.
    pub pool_size: usize,
    /// Whether operations run one by one or concurrently.
    pub mode: ExecutionMode,
    /// Behavior of `read` for missing files.
    pub missing_read: MissingReadPolicy,
    /// Seed for generated file contents. Random if unset.
    pub seed: Option<u64>,
}

impl WorkerConfig {
    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            base_dir: self.base_dir.clone(),
            task_id: self.task_id,
            file_size_mb: self.file_size_mb,
            pool_size: self.pool_size,
            missing_read: self.missing_read,
            seed: self.seed,
        }
    }
}

/// Receives the records produced by workers.
///
/// Records are keyed by their [`operation_type`](MetricRecord::operation_type).
pub trait MetricSink: Send + Sync {
    /// Passes a record downstream.
    fn emit(&self, record: MetricRecord) -> Result<(), SinkError>;
}

impl MetricSink for mpsc::UnboundedSender<MetricRecord> {
    fn emit(&self, record: MetricRecord) -> Result<(), SinkError> {
        self.send(record).map_err(|_| SinkError::Closed)
    }
}

impl MetricSink for Mutex<Vec<MetricRecord>> {
    fn emit(&self, record: MetricRecord) -> Result<(), SinkError> {
        self.lock().map_err(|_| SinkError::Closed)?.push(record);
        Ok(())
    }
}

/// A liveness signal emitted by a running worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The worker is about to run its first operation.
    Started {
        /// The reporting worker.
        task_id: u32,
        /// Number of operations the worker will run.
        total: u64,
    },
    /// The worker completed another batch of operations.
    Advanced {
        /// The reporting worker.
        task_id: u32,
        /// Operations completed so far.
        completed: u64,
        /// Number of operations the worker will run.
        total: u64,
    },
    /// The worker completed all of its operations.
    Finished {
        /// The reporting worker.
        task_id: u32,
        /// Operations completed.
        completed: u64,
        /// How many of them failed.
        errors: u64,
    },
}

/// Observes the progress of workers.
pub trait ProgressReporter: Send + Sync {
    /// Called at start, every [`PROGRESS_INTERVAL`] operations and at completion.
    fn report(&self, progress: Progress);
}

/// Reports progress as log messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: Progress) {
        match progress {
            Progress::Started { task_id, total } => {
                tracing::info!(task_id, total, "worker started");
            }
            Progress::Advanced {
                task_id,
                completed,
                total,
            } => {
                tracing::debug!(task_id, completed, total, "worker progress");
            }
            Progress::Finished {
                task_id,
                completed,
                errors,
            } => {
                tracing::info!(task_id, completed, errors, "worker finished");
            }
        }
    }
}

/// Totals of a finished worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSummary {
    /// The worker that ran.
    pub task_id: u32,
    /// Operations run, including failures.
    pub completed: u64,
    /// Operations that produced an error record.
    pub errors: u64,
}

/// Returns the operation schedule: index `i` runs `operations[i % operations.len()]`.
///
/// Yields nothing if `operations` is empty.
pub fn round_robin(operations: &[String], count: u64) -> impl Iterator<Item = (u64, &str)> {
    let count = if operations.is_empty() { 0 } else { count };
    (0..count).map(move |index| {
        let op = &operations[(index % operations.len() as u64) as usize];
        (index, op.as_str())
    })
}

/// Runs a fixed schedule of operations and emits one record per operation.
#[derive(Debug)]
pub struct Worker {
    config: WorkerConfig,
    executor: Executor,
}

impl Worker {
    /// Creates a worker for the built-in operations.
    pub fn new(backend: SharedBackend, config: WorkerConfig) -> Self {
        let executor = Executor::new(backend, config.executor_config());
        Self { config, executor }
    }

    /// Creates a worker resolving operation names through `catalog`.
    pub fn with_catalog(
        backend: SharedBackend,
        catalog: Arc<OperationCatalog>,
        config: WorkerConfig,
    ) -> Self {
        let executor = Executor::with_catalog(backend, catalog, config.executor_config());
        Self { config, executor }
    }

    /// The identifier of this worker.
    pub fn task_id(&self) -> u32 {
        self.config.task_id
    }

    /// Runs all operations, passing every record to `sink`.
    ///
    /// Operation failures are recorded and counted, never returned. The worker only aborts if
    /// the sink fails. In either case the executor is shut down before this returns.
    pub async fn run(
        self,
        sink: &dyn MetricSink,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkerSummary, WorkerError> {
        let Self { config, executor } = self;
        if config.operations.is_empty() {
            return Err(WorkerError::NoOperations);
        }

        let task_id = config.task_id;
        let total = config.ops_per_worker;
        progress.report(Progress::Started { task_id, total });

        let mut tally = Tally {
            task_id,
            total,
            completed: 0,
            errors: 0,
            sink,
            progress,
        };

        let schedule = round_robin(&config.operations, total);
        match config.mode {
            ExecutionMode::Sequential => {
                for (index, op) in schedule {
                    tally.record(executor.execute(op, index).await)?;
                }
            }
            ExecutionMode::Concurrent => {
                let mut pending = schedule
                    .map(|(index, op)| executor.execute_async(op, index))
                    .collect::<Result<FuturesUnordered<_>, _>>()?;

                while let Some(record) = pending.next().await {
                    tally.record(record)?;
                }
            }
        }

        executor.shutdown();

        let summary = WorkerSummary {
            task_id,
            completed: tally.completed,
            errors: tally.errors,
        };
        progress.report(Progress::Finished {
            task_id,
            completed: summary.completed,
            errors: summary.errors,
        });

        Ok(summary)
    }
}

struct Tally<'a> {
    task_id: u32,
    total: u64,
    completed: u64,
    errors: u64,
    sink: &'a dyn MetricSink,
    progress: &'a dyn ProgressReporter,
}

impl Tally<'_> {
    fn record(&mut self, record: MetricRecord) -> Result<(), WorkerError> {
        if record.is_error() {
            self.errors += 1;
        }
        self.sink.emit(record)?;
        self.completed += 1;

        if self.completed % PROGRESS_INTERVAL == 0 && self.completed < self.total {
            self.progress.report(Progress::Advanced {
                task_id: self.task_id,
                completed: self.completed,
                total: self.total,
            });
        }
        Ok(())
    }
}
