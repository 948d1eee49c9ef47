use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use slive_types::MetricRecord;
use tokio::task::JoinHandle;

use crate::backend::SharedBackend;
use crate::catalog::{MissingReadPolicy, OperationCatalog, Outcome, Target};
use crate::error::ExecutorError;
use crate::payload::PayloadSource;
use crate::pool::WorkerPool;

/// Default number of operations an executor runs at once.
pub const DEFAULT_POOL_SIZE: usize = 10;

const MEBIBYTE: u64 = 1024 * 1024;

/// Settings of a single [`Executor`].
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Directory under which all operation paths are derived.
    pub base_dir: String,
    /// Identifier of the owning task, used to separate paths of concurrent workers.
    pub task_id: u32,
    /// Size of files created by `write`, in mebibytes.
    pub file_size_mb: u64,
    /// Maximum number of concurrently running asynchronous operations.
    pub pool_size: usize,
    /// Behavior of `read` for missing files.
    pub missing_read: MissingReadPolicy,
    /// Seed for generated file contents. Random if unset.
    pub seed: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_dir: "slive".into(),
            task_id: 0,
            file_size_mb: 10,
            pool_size: DEFAULT_POOL_SIZE,
            missing_read: MissingReadPolicy::default(),
            seed: None,
        }
    }
}

/// Runs named operations against a backend and measures them.
///
/// Operations never fail from the caller's perspective. Each run produces exactly one
/// [`MetricRecord`]:
///
///  - `LONG:<op>*duration` with the elapsed milliseconds on success,
///  - `LONG:<op>*error` with the elapsed milliseconds if the backend failed,
///  - `LONG:<op>*skipped` with value `0` if there was nothing to do,
///  - `LONG:<op>*error` with value `-1` if `<op>` is not in the catalog.
///
/// Asynchronous runs share a bounded pool, which is shut down by [`shutdown`](Self::shutdown) or
/// when the executor is dropped.
#[derive(Debug)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
    pool: WorkerPool,
}

#[derive(Debug)]
struct ExecutorInner {
    backend: SharedBackend,
    catalog: Arc<OperationCatalog>,
    base_dir: String,
    task_id: u32,
    file_size: u64,
    missing_read: MissingReadPolicy,
    payloads: PayloadSource,
}

impl Executor {
    /// Creates an executor for the built-in operations.
    pub fn new(backend: SharedBackend, config: ExecutorConfig) -> Self {
        Self::with_catalog(backend, Arc::new(OperationCatalog::builtin()), config)
    }

    /// Creates an executor resolving operation names through `catalog`.
    pub fn with_catalog(
        backend: SharedBackend,
        catalog: Arc<OperationCatalog>,
        config: ExecutorConfig,
    ) -> Self {
        let payloads = match config.seed {
            Some(seed) => PayloadSource::new(seed),
            None => PayloadSource::random(),
        };

        let inner = ExecutorInner {
            backend,
            catalog,
            base_dir: config.base_dir,
            task_id: config.task_id,
            file_size: config.file_size_mb.saturating_mul(MEBIBYTE),
            missing_read: config.missing_read,
            payloads,
        };

        Self {
            inner: Arc::new(inner),
            pool: WorkerPool::new(config.pool_size),
        }
    }

    /// Runs the operation `op` with the given index to completion.
    pub async fn execute(&self, op: &str, index: u64) -> MetricRecord {
        self.inner.execute(op, index).await
    }

    /// Schedules the operation `op` on the pool.
    ///
    /// The returned handle resolves to the same record [`execute`](Self::execute) would produce.
    /// Fails with [`ExecutorError::ShutDown`] once the executor has been shut down.
    pub fn execute_async(&self, op: &str, index: u64) -> Result<OperationHandle, ExecutorError> {
        let inner = Arc::clone(&self.inner);
        let operation: Arc<str> = op.into();

        let handle = self.pool.spawn({
            let operation = Arc::clone(&operation);
            async move { inner.execute(&operation, index).await }
        })?;

        Ok(OperationHandle { operation, handle })
    }

    /// Stops accepting asynchronous work. Already scheduled operations still complete.
    ///
    /// Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        if self.pool.shutdown() {
            tracing::debug!(task_id = self.inner.task_id, "executor shut down");
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    /// Shuts the executor down and waits for all scheduled operations to finish.
    pub async fn join(&self) {
        self.shutdown();
        self.pool.join().await;
    }

    /// Returns the number of scheduled operations that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pool.pending()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ExecutorInner {
    async fn execute(&self, op: &str, index: u64) -> MetricRecord {
        let Some((name, operation)) = self.catalog.resolve(op) else {
            tracing::error!(operation = op, index, "unknown operation type");
            return checked(op, MetricRecord::error(op, -1));
        };

        let target = Target {
            backend: &*self.backend,
            base_dir: &self.base_dir,
            task_id: self.task_id,
            index,
            file_size: self.file_size,
            payloads: &self.payloads,
            missing_read: self.missing_read,
        };

        let start = Instant::now();
        let result = operation.run(&target).await;
        let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        let record = match result {
            Ok(Outcome::Completed) => MetricRecord::duration(name, elapsed),
            Ok(Outcome::Skipped) => MetricRecord::skipped(name),
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    operation = name,
                    task_id = self.task_id,
                    index,
                    "operation failed"
                );
                MetricRecord::error(name, elapsed)
            }
        };
        checked(name, record)
    }
}

/// Falls back to [`MetricRecord::invalid_operation`] for names that cannot appear in a key.
fn checked(name: &str, record: slive_types::Result<MetricRecord>) -> MetricRecord {
    record.unwrap_or_else(|error| {
        tracing::error!(
            error = &error as &dyn std::error::Error,
            operation = name,
            "operation name cannot be recorded"
        );
        MetricRecord::invalid_operation()
    })
}

/// A handle to an operation scheduled with [`Executor::execute_async`].
///
/// Resolves to the operation's record. If the task running the operation panicked, the handle
/// resolves to an error record with value `-1`.
#[derive(Debug)]
pub struct OperationHandle {
    operation: Arc<str>,
    handle: JoinHandle<MetricRecord>,
}

impl OperationHandle {
    /// The operation name this handle was scheduled with.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Future for OperationHandle {
    type Output = MetricRecord;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| match result {
            Ok(record) => record,
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    operation = &*self.operation,
                    "operation task failed"
                );
                checked(&self.operation, MetricRecord::error(&*self.operation, -1))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use slive_types::{DataType, MetricValue};

    use super::*;
    use crate::backend::{Backend, BackendError, BackendResult, InMemoryBackend};
    use crate::catalog::Operation;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            base_dir: "/test".into(),
            task_id: 2,
            file_size_mb: 1,
            pool_size: 4,
            missing_read: MissingReadPolicy::Error,
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn mkdir_creates_task_directory() {
        let backend = InMemoryBackend::new();
        let executor = Executor::new(Arc::new(backend.clone()), config());

        let record = executor.execute("mkdir", 5).await;

        assert_eq!(record.key_string(), "LONG:mkdir*duration");
        assert!(record.value().as_i64().unwrap() >= 0);
        assert!(backend.contains("test/mkdir/2/dir_5"));
    }

    #[tokio::test]
    async fn write_creates_file_of_configured_size() {
        let backend = InMemoryBackend::new();
        let executor = Executor::new(Arc::new(backend.clone()), config());

        let record = executor.execute("write", 0).await;

        assert_eq!(record.measurement_type(), "duration");
        assert_eq!(
            backend.contents("test/write/2/file_0").unwrap().len(),
            1024 * 1024
        );
    }

    #[tokio::test]
    async fn unknown_operation_yields_error_record() {
        slive_test::tracing::init();
        let executor = Executor::new(Arc::new(InMemoryBackend::new()), config());

        let record = executor.execute("explode", 0).await;

        assert_eq!(record.data_type(), DataType::Long);
        assert_eq!(record.operation_type(), "explode");
        assert_eq!(record.measurement_type(), "error");
        assert_eq!(record.value(), &MetricValue::Long(-1));
    }

    #[tokio::test]
    async fn unrecordable_name_yields_invalid_operation() {
        let executor = Executor::new(Arc::new(InMemoryBackend::new()), config());

        let record = executor.execute("write*read", 0).await;

        assert_eq!(record.key_string(), "LONG:invalid_operation*error");
        assert_eq!(record.value(), &MetricValue::Long(-1));
    }

    #[tokio::test]
    async fn failed_operation_yields_error_record() {
        let executor = Executor::new(Arc::new(InMemoryBackend::new()), config());

        let record = executor.execute("read", 0).await;

        assert!(record.is_error());
        assert!(record.value().as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn skipped_read_yields_skipped_record() {
        let config = ExecutorConfig {
            missing_read: MissingReadPolicy::Skip,
            ..config()
        };
        let executor = Executor::new(Arc::new(InMemoryBackend::new()), config);

        let record = executor.execute("read", 0).await;

        assert_eq!(record.key_string(), "LONG:read*skipped");
        assert_eq!(record.value(), &MetricValue::Long(0));
    }

    #[tokio::test]
    async fn aliases_report_canonical_name() {
        let backend = InMemoryBackend::new();
        let executor = Executor::new(Arc::new(backend), config());
        executor.execute("write", 0).await;

        let record = executor.execute("ls", 0).await;
        assert_eq!(record.key_string(), "LONG:list*duration");
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait::async_trait]
    impl Backend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn mkdirs(&self, _: &str) -> BackendResult<()> {
            Err(BackendError::Unsupported("mkdirs"))
        }
        async fn create(&self, _: &str, _: bool) -> BackendResult<crate::FileWriter> {
            Err(BackendError::Unsupported("create"))
        }
        async fn append(&self, _: &str) -> BackendResult<crate::FileWriter> {
            Err(BackendError::Unsupported("append"))
        }
        async fn open(&self, _: &str) -> BackendResult<crate::PayloadStream> {
            Err(BackendError::Unsupported("open"))
        }
        async fn truncate(&self, _: &str, _: u64) -> BackendResult<()> {
            Err(BackendError::Unsupported("truncate"))
        }
        async fn delete(&self, _: &str, _: bool) -> BackendResult<bool> {
            Err(BackendError::Unsupported("delete"))
        }
        async fn rename(&self, _: &str, _: &str) -> BackendResult<bool> {
            Err(BackendError::Unsupported("rename"))
        }
        async fn exists(&self, _: &str) -> BackendResult<bool> {
            Err(BackendError::Unsupported("exists"))
        }
        async fn get_status(&self, _: &str) -> BackendResult<crate::FileStatus> {
            Err(BackendError::Unsupported("get_status"))
        }
        async fn set_permission(&self, _: &str, _: u32) -> BackendResult<()> {
            Err(BackendError::Unsupported("set_permission"))
        }
        async fn create_symlink(&self, _: &str, _: &str, _: bool) -> BackendResult<()> {
            Err(BackendError::Unsupported("create_symlink"))
        }
        async fn list_status(&self, _: &str) -> BackendResult<Vec<crate::FileStatus>> {
            Err(BackendError::Unsupported("list_status"))
        }
    }

    #[tokio::test]
    async fn every_builtin_reports_backend_failures() {
        slive_test::tracing::init();
        let executor = Executor::new(Arc::new(Broken), config());

        for op in crate::BuiltinOperation::ALL {
            let record = executor.execute(op.name(), 0).await;
            assert!(record.is_error(), "{op} did not fail");
            assert_eq!(record.operation_type(), op.name());
        }
    }

    /// Delegates to an in-memory backend, failing the second truncate.
    #[derive(Debug, Default)]
    struct FailingTruncate {
        inner: InMemoryBackend,
        appends: AtomicUsize,
        truncates: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Backend for FailingTruncate {
        fn name(&self) -> &'static str {
            "failing-truncate"
        }
        async fn mkdirs(&self, path: &str) -> BackendResult<()> {
            self.inner.mkdirs(path).await
        }
        async fn create(&self, path: &str, overwrite: bool) -> BackendResult<crate::FileWriter> {
            self.inner.create(path, overwrite).await
        }
        async fn append(&self, path: &str) -> BackendResult<crate::FileWriter> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            self.inner.append(path).await
        }
        async fn open(&self, path: &str) -> BackendResult<crate::PayloadStream> {
            self.inner.open(path).await
        }
        async fn truncate(&self, path: &str, len: u64) -> BackendResult<()> {
            if self.truncates.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(BackendError::Unsupported("truncate"));
            }
            self.inner.truncate(path, len).await
        }
        async fn delete(&self, path: &str, recursive: bool) -> BackendResult<bool> {
            self.inner.delete(path, recursive).await
        }
        async fn rename(&self, from: &str, to: &str) -> BackendResult<bool> {
            self.inner.rename(from, to).await
        }
        async fn exists(&self, path: &str) -> BackendResult<bool> {
            self.inner.exists(path).await
        }
        async fn get_status(&self, path: &str) -> BackendResult<crate::FileStatus> {
            self.inner.get_status(path).await
        }
        async fn set_permission(&self, path: &str, mode: u32) -> BackendResult<()> {
            self.inner.set_permission(path, mode).await
        }
        async fn create_symlink(
            &self,
            target: &str,
            link: &str,
            create_parent: bool,
        ) -> BackendResult<()> {
            self.inner.create_symlink(target, link, create_parent).await
        }
        async fn list_status(&self, path: &str) -> BackendResult<Vec<crate::FileStatus>> {
            self.inner.list_status(path).await
        }
    }

    #[tokio::test]
    async fn append_truncate_stops_at_failed_round() {
        let backend = Arc::new(FailingTruncate::default());
        let executor = Executor::new(backend.clone(), config());

        let record = executor.execute("append_truncate", 3).await;

        assert_eq!(record.key_string(), "LONG:append_truncate*error");
        assert!(record.value().as_i64().unwrap() >= 0);
        // Round one re-opened the file once, then its truncate failed.
        assert_eq!(backend.appends.load(Ordering::SeqCst), 1);
        assert_eq!(backend.truncates.load(Ordering::SeqCst), 2);
        assert_eq!(
            backend
                .inner
                .contents("test/append_truncate/2/file_3")
                .unwrap()
                .len(),
            500 + 512
        );
    }

    #[tokio::test]
    async fn async_execution_matches_sync() {
        let backend = InMemoryBackend::new();
        let executor = Executor::new(Arc::new(backend.clone()), config());

        let handles: Vec<_> = (0..10)
            .map(|i| executor.execute_async("mkdir", i).unwrap())
            .collect();
        for handle in handles {
            assert_eq!(handle.operation(), "mkdir");
            assert_eq!(handle.await.measurement_type(), "duration");
        }

        for i in 0..10 {
            assert!(backend.contains(&format!("test/mkdir/2/dir_{i}")));
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_rejects_work() {
        let executor = Executor::new(Arc::new(InMemoryBackend::new()), config());
        let handle = executor.execute_async("mkdir", 0).unwrap();

        executor.shutdown();
        executor.shutdown();

        assert!(executor.is_shut_down());
        assert_eq!(
            executor.execute_async("mkdir", 1).unwrap_err(),
            ExecutorError::ShutDown
        );

        // Work accepted before the shutdown still completes.
        assert!(!handle.await.is_error());
        executor.join().await;
        assert_eq!(executor.pending(), 0);

        // Synchronous execution does not need the pool.
        assert!(!executor.execute("mkdir", 2).await.is_error());
    }

    #[derive(Debug)]
    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Operation for Counting {
        async fn run(&self, _target: &Target<'_>) -> BackendResult<Outcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Completed)
        }
    }

    #[tokio::test]
    async fn join_waits_for_scheduled_operations() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut catalog = OperationCatalog::empty();
        catalog.register("count", Counting(Arc::clone(&counter)));

        let executor = Executor::with_catalog(
            Arc::new(InMemoryBackend::new()),
            Arc::new(catalog),
            config(),
        );

        for i in 0..25 {
            // Handles are dropped; the operations still run.
            drop(executor.execute_async("count", i).unwrap());
        }
        executor.join().await;

        assert_eq!(counter.load(Ordering::SeqCst), 25);
    }
}
