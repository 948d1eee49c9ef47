//! The service layer runs benchmark operations against hierarchical storage.
//!
//! A [`Worker`] cycles through a list of operation names and hands each one to its
//! [`Executor`], which resolves the name in an [`OperationCatalog`], runs it against a
//! [`Backend`] and measures it. Every run yields one [`MetricRecord`](slive_types::MetricRecord),
//! which the worker passes to a [`MetricSink`]. The [`reduce`] module turns the collected records
//! of one operation type into a [`Summary`](reduce::Summary).
//!
//! Two backends are included: [`LocalFs`] for a directory on the local filesystem and
//! [`InMemoryBackend`] for tests and dry runs.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod catalog;
mod error;
mod executor;
mod operations;
mod payload;
mod pool;
pub mod reduce;
mod worker;

pub use backend::{
    Backend, BackendError, BackendResult, FileKind, FileStatus, FileWriter, InMemoryBackend,
    LocalFs, PayloadStream, SharedBackend,
};
pub use catalog::{
    BuiltinOperation, MissingReadPolicy, Operation, OperationCatalog, Outcome, Target,
    UnknownOperation, namespace,
};
pub use error::{ExecutorError, SinkError, WorkerError};
pub use executor::{DEFAULT_POOL_SIZE, Executor, ExecutorConfig, OperationHandle};
pub use operations::{
    APPEND_SIZE, APPEND_TRUNCATE_CHUNK, APPEND_TRUNCATE_ITERATIONS, APPEND_TRUNCATE_LENGTH,
    FILE_PERMISSION,
};
pub use payload::{Payload, PayloadSource};
pub use worker::{
    ExecutionMode, LogProgress, MetricSink, ModeParseError, PROGRESS_INTERVAL, Progress,
    ProgressReporter, Worker, WorkerConfig, WorkerSummary, round_robin,
};
