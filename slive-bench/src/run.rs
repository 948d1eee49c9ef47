//! Runs all workers against one backend and assembles the report.

use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use slive_service::reduce::{Aggregator, Summary};
use slive_service::{
    InMemoryBackend, LocalFs, LogProgress, Progress, ProgressReporter, SharedBackend, Worker,
};
use slive_types::MetricRecord;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{Config, Storage};
use crate::report::{Parameters, Report, write_report};

/// Groups records by operation type and keeps merged totals.
#[derive(Debug, Default)]
pub struct Collector {
    groups: BTreeMap<String, Aggregator>,
    totals: BTreeMap<(String, String), MetricRecord>,
}

impl Collector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record emitted by a worker.
    pub fn add(&mut self, record: MetricRecord) {
        let operation = record.operation_type();
        match self.groups.get_mut(operation) {
            Some(aggregator) => aggregator.consume_record(&record),
            None => {
                let mut aggregator = Aggregator::new(operation);
                aggregator.consume_record(&record);
                self.groups.insert(operation.to_owned(), aggregator);
            }
        }

        let key = (
            record.operation_type().to_owned(),
            record.measurement_type().to_owned(),
        );
        match self.totals.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
            Entry::Occupied(mut entry) => match entry.get().merge(&record) {
                Ok(merged) => {
                    entry.insert(merged);
                }
                Err(error) => {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        "failed to merge metric records"
                    );
                }
            },
        }
    }

    /// Returns one summary per operation type with at least one valid sample.
    pub fn summaries(&self) -> Vec<Summary> {
        self.groups
            .values()
            .filter_map(Aggregator::finish)
            .collect()
    }

    /// Returns the merged records, ordered by operation and measurement type.
    pub fn totals(&self) -> Vec<MetricRecord> {
        self.totals.values().cloned().collect()
    }
}

/// Shows the overall progress of all workers on a progress bar.
pub struct SpinnerProgress {
    bar: ProgressBar,
    completed: Mutex<HashMap<u32, u64>>,
}

impl SpinnerProgress {
    /// Creates a progress bar for `total` operations.
    pub fn new(total: u64) -> Result<Self> {
        let bar = ProgressBar::new(total)
            .with_style(ProgressStyle::with_template(
                "{spinner} {msg} {elapsed}\n{wide_bar} {pos}/{len}",
            )?)
            .with_message("Running benchmark:");
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(Self {
            bar,
            completed: Mutex::new(HashMap::new()),
        })
    }

    fn advance(&self, task_id: u32, completed: u64) {
        let mut tasks = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = tasks.insert(task_id, completed).unwrap_or(0);
        self.bar.inc(completed.saturating_sub(previous));
    }

    /// Removes the progress bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for SpinnerProgress {
    fn report(&self, progress: Progress) {
        match progress {
            Progress::Started { .. } => (),
            Progress::Advanced {
                task_id, completed, ..
            }
            | Progress::Finished {
                task_id, completed, ..
            } => self.advance(task_id, completed),
        }

        self.bar.suspend(|| LogProgress.report(progress));
    }
}

/// Creates the backend described by `storage`.
pub fn build_backend(storage: &Storage) -> Result<SharedBackend> {
    let backend: SharedBackend = match storage {
        Storage::FileSystem { path } => {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create storage directory {}", path.display()))?;
            Arc::new(LocalFs::new(path))
        }
        Storage::Memory => Arc::new(InMemoryBackend::new()),
    };

    tracing::debug!(backend = backend.name(), %storage, "storage backend ready");
    Ok(backend)
}

/// Validates `config`, runs the benchmark and writes the report to [`Config::output`].
///
/// A report that cannot be written is logged. The run still succeeds with the report.
pub async fn run(config: &Config) -> Result<Report> {
    config.validate()?;
    let backend = build_backend(&config.storage)?;

    let report = run_with_backend(config, backend).await?;
    if let Err(error) = write_report(&report, &config.output).await {
        let error = format!("{error:#}");
        tracing::error!(%error, "failed to write report");
    }

    Ok(report)
}

/// Runs the benchmark against an existing backend.
///
/// Failed workers are logged. The report contains every record emitted before the failure.
pub async fn run_with_backend(config: &Config, backend: SharedBackend) -> Result<Report> {
    let run_id = Uuid::now_v7();
    tracing::info!(%run_id, workers = config.workers, "starting benchmark");

    let total = u64::from(config.workers).saturating_mul(config.ops_per_worker);
    let progress = Arc::new(SpinnerProgress::new(total)?);
    let (sender, mut receiver) = mpsc::unbounded_channel::<MetricRecord>();
    let start = Instant::now();

    let tasks: Vec<_> = (0..config.workers)
        .map(|task_id| {
            let worker = Worker::new(backend.clone(), config.worker_config(task_id));
            let sender = sender.clone();
            let progress = Arc::clone(&progress);
            let task = tokio::spawn(async move { worker.run(&sender, progress.as_ref()).await });
            (task_id, task)
        })
        .collect();
    drop(sender);

    let mut collector = Collector::new();
    while let Some(record) = receiver.recv().await {
        collector.add(record);
    }

    for (task_id, task) in tasks {
        match task.await {
            Ok(Ok(summary)) => {
                tracing::debug!(task_id, errors = summary.errors, "worker completed");
            }
            Ok(Err(error)) => {
                tracing::error!(
                    task_id,
                    error = &error as &dyn std::error::Error,
                    "worker failed"
                );
            }
            Err(error) => {
                tracing::error!(
                    task_id,
                    error = &error as &dyn std::error::Error,
                    "worker task panicked"
                );
            }
        }
    }

    let elapsed = start.elapsed();
    progress.finish();
    tracing::info!(%run_id, elapsed = ?elapsed, "benchmark finished");

    Ok(Report {
        run_id,
        parameters: Parameters {
            storage: config.storage.to_string(),
            base_dir: config.base_dir.clone(),
            operations: config.operations.clone(),
            workers: config.workers,
            ops_per_worker: config.ops_per_worker,
            file_size_mb: config.file_size_mb,
            pool_size: config.pool_size,
            mode: config.mode,
            elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        },
        summaries: collector.summaries(),
        totals: collector.totals(),
    })
}
