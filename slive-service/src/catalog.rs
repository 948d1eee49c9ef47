//! The set of named operations an executor can perform.
//!
//! Every operation works on a [`Target`], which derives concrete paths from the run's base
//! directory, the executing task and the operation index. The built-in operations are
//! registered under their canonical names by [`OperationCatalog::builtin`]. Custom operations can
//! be added with [`OperationCatalog::register`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendResult};
use crate::operations;
use crate::payload::{Payload, PayloadSource};

/// Namespaces directly below the base directory, one per family of operations.
pub mod namespace {
    /// Directories created by `mkdir` and removed by `delete_dir`.
    pub const MKDIR: &str = "mkdir";
    /// Files created by `write` and used by every other file operation.
    pub const WRITE: &str = "write";
    /// Files repeatedly appended to and truncated by `append_truncate`.
    pub const APPEND_TRUNCATE: &str = "append_truncate";
}

/// What to do when `read` finds no file at its target path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingReadPolicy {
    /// Record the read as failed.
    #[default]
    Error,
    /// Record the read as skipped, without affecting statistics.
    Skip,
}

/// The result of an operation that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operation was performed.
    Completed,
    /// The operation found nothing to act on and deliberately did nothing.
    Skipped,
}

/// Everything an operation needs to locate and act on its paths.
#[derive(Debug)]
pub struct Target<'a> {
    pub(crate) backend: &'a dyn Backend,
    pub(crate) base_dir: &'a str,
    pub(crate) task_id: u32,
    pub(crate) index: u64,
    pub(crate) file_size: u64,
    pub(crate) payloads: &'a PayloadSource,
    pub(crate) missing_read: MissingReadPolicy,
}

impl Target<'_> {
    /// The backend to operate on.
    pub fn backend(&self) -> &dyn Backend {
        self.backend
    }

    /// The executing task.
    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    /// The index of this operation within its worker.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The size of files created by `write`, in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The behavior of `read` for missing files.
    pub fn missing_read(&self) -> MissingReadPolicy {
        self.missing_read
    }

    /// Returns `baseDir/namespace/taskId`.
    pub fn task_dir(&self, namespace: &str) -> String {
        format!("{}/{namespace}/{}", self.base_dir, self.task_id)
    }

    /// Returns `baseDir/namespace/taskId/name`.
    pub fn path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.task_dir(namespace))
    }

    /// Returns `baseDir/namespace/taskId/file_<index>`.
    pub fn file_path(&self, namespace: &str) -> String {
        self.path(namespace, &format!("file_{}", self.index))
    }

    /// Returns `baseDir/namespace/taskId/dir_<index>`.
    pub fn dir_path(&self, namespace: &str) -> String {
        self.path(namespace, &format!("dir_{}", self.index))
    }

    /// Returns `baseDir/link_<taskId>/link_<index>`, where `create_symlink` places its links.
    pub fn link_path(&self) -> String {
        format!("{}/link_{}/link_{}", self.base_dir, self.task_id, self.index)
    }

    /// Returns a fresh randomized payload of `len` bytes.
    pub fn payload(&self, len: u64) -> Payload {
        self.payloads.payload(len)
    }
}

/// A named unit of filesystem work.
///
/// Implementations report failures as errors; the executor turns them into error metrics. They
/// must never panic on backend failures.
#[async_trait::async_trait]
pub trait Operation: fmt::Debug + Send + Sync + 'static {
    /// Performs the operation once against `target`.
    async fn run(&self, target: &Target<'_>) -> BackendResult<Outcome>;
}

/// The operations shipped with the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinOperation {
    /// Create `mkdir/<task>/dir_<i>` with all parents.
    Mkdir,
    /// Create or overwrite `write/<task>/file_<i>` with random content.
    Write,
    /// Read `write/<task>/file_<i>` to the end.
    Read,
    /// Delete `write/<task>/file_<i>`.
    DeleteFile,
    /// Recursively delete `mkdir/<task>/dir_<i>`.
    DeleteDir,
    /// List the children of `write/<task>`.
    List,
    /// Rename `write/<task>/file_<i>` to `write/<task>/file_renamed_<i>`.
    Rename,
    /// Fetch the status of `write/<task>/file_<i>`.
    GetFileStatus,
    /// Check whether `write/<task>/file_<i>` exists.
    Exists,
    /// Set `write/<task>/file_<i>` to mode `0644`.
    SetPermission,
    /// Append random bytes to `write/<task>/file_<i>`.
    Append,
    /// Link `link_<task>/link_<i>` to `write/<task>/file_<i>`.
    CreateSymlink,
    /// Alternate appends and truncation on `append_truncate/<task>/file_<i>`.
    AppendTruncate,
}

impl BuiltinOperation {
    /// All built-in operations, in registration order.
    pub const ALL: [Self; 13] = [
        Self::Mkdir,
        Self::Write,
        Self::Read,
        Self::DeleteFile,
        Self::DeleteDir,
        Self::List,
        Self::Rename,
        Self::GetFileStatus,
        Self::Exists,
        Self::SetPermission,
        Self::Append,
        Self::CreateSymlink,
        Self::AppendTruncate,
    ];

    /// The canonical name used in configuration and metric keys.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mkdir => "mkdir",
            Self::Write => "write",
            Self::Read => "read",
            Self::DeleteFile => "delete_file",
            Self::DeleteDir => "delete_dir",
            Self::List => "list",
            Self::Rename => "rename",
            Self::GetFileStatus => "get_file_status",
            Self::Exists => "exists",
            Self::SetPermission => "set_permission",
            Self::Append => "append",
            Self::CreateSymlink => "create_symlink",
            Self::AppendTruncate => "append_truncate",
        }
    }

    /// Alternative names accepted for this operation.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::List => &["ls"],
            _ => &[],
        }
    }
}

impl fmt::Display for BuiltinOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown operation name.
#[derive(Debug, thiserror::Error)]
#[error("unknown operation `{0}`")]
pub struct UnknownOperation(String);

impl FromStr for BuiltinOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s || op.aliases().contains(&s))
            .ok_or_else(|| UnknownOperation(s.to_owned()))
    }
}

#[async_trait::async_trait]
impl Operation for BuiltinOperation {
    async fn run(&self, target: &Target<'_>) -> BackendResult<Outcome> {
        match self {
            Self::Mkdir => operations::mkdir(target).await,
            Self::Write => operations::write(target).await,
            Self::Read => operations::read(target).await,
            Self::DeleteFile => operations::delete_file(target).await,
            Self::DeleteDir => operations::delete_dir(target).await,
            Self::List => operations::list(target).await,
            Self::Rename => operations::rename(target).await,
            Self::GetFileStatus => operations::get_file_status(target).await,
            Self::Exists => operations::exists(target).await,
            Self::SetPermission => operations::set_permission(target).await,
            Self::Append => operations::append(target).await,
            Self::CreateSymlink => operations::create_symlink(target).await,
            Self::AppendTruncate => operations::append_truncate(target).await,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    name: Arc<str>,
    operation: Arc<dyn Operation>,
}

/// A registry mapping operation names to their implementations.
#[derive(Clone, Debug, Default)]
pub struct OperationCatalog {
    entries: BTreeMap<String, Entry>,
}

impl OperationCatalog {
    /// Creates a catalog without any operations.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a catalog of all [`BuiltinOperation`]s, including their aliases.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for op in BuiltinOperation::ALL {
            catalog.register(op.name(), op);
            for alias in op.aliases() {
                catalog.alias(*alias, op.name());
            }
        }
        catalog
    }

    /// Registers `operation` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, operation: impl Operation) -> &mut Self {
        let name = name.into();
        let entry = Entry {
            name: name.as_str().into(),
            operation: Arc::new(operation),
        };
        self.entries.insert(name, entry);
        self
    }

    /// Makes `alias` resolve to the operation registered as `canonical`.
    ///
    /// Records of aliased operations are reported under the canonical name. Does nothing if
    /// `canonical` is not registered.
    pub fn alias(&mut self, alias: impl Into<String>, canonical: &str) -> &mut Self {
        if let Some(entry) = self.entries.get(canonical).cloned() {
            self.entries.insert(alias.into(), entry);
        }
        self
    }

    /// Looks up an operation, returning its canonical name and implementation.
    pub fn resolve(&self, name: &str) -> Option<(&str, &dyn Operation)> {
        self.entries
            .get(name)
            .map(|entry| (&*entry.name, &*entry.operation))
    }

    /// Returns `true` if `name` resolves to an operation.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns all resolvable names, including aliases, in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
