use thiserror::Error;

/// Errors raised when scheduling operations on an [`Executor`](crate::Executor).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor's pool was shut down and accepts no further work.
    #[error("executor has been shut down")]
    ShutDown,
}

/// Errors raised by a downstream [`MetricSink`](crate::MetricSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiving side of the sink is gone.
    #[error("metric sink is closed")]
    Closed,
}

/// Errors that abort a [`Worker`](crate::Worker).
///
/// Failures of individual operations never surface here; they are recorded as error metrics.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker was configured without any operations to cycle through.
    #[error("no operations configured")]
    NoOperations,

    /// Scheduling an operation on the executor failed.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Emitting a record downstream failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}
