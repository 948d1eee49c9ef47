use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// A type-erased [`Backend`] instance, shared between an executor and its pool tasks.
pub type SharedBackend = Arc<dyn Backend>;

/// The content of a file, streamed in chunks.
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// An open file handle for writing.
///
/// Data is only guaranteed to be visible to other calls after
/// [`shutdown`](tokio::io::AsyncWriteExt::shutdown) has completed.
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A hierarchical file store that benchmark operations run against.
///
/// Paths are `/`-separated and relative to the root of the backend. Leading slashes are ignored.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates a directory and all of its missing parents.
    async fn mkdirs(&self, path: &str) -> BackendResult<()>;

    /// Creates a file, along with missing parent directories, and opens it for writing.
    ///
    /// If the file exists, it is truncated when `overwrite` is set and rejected with
    /// [`BackendError::AlreadyExists`] otherwise.
    async fn create(&self, path: &str, overwrite: bool) -> BackendResult<FileWriter>;

    /// Opens an existing file for writing at its end.
    async fn append(&self, path: &str) -> BackendResult<FileWriter>;

    /// Opens an existing file for reading.
    async fn open(&self, path: &str) -> BackendResult<PayloadStream>;

    /// Sets the length of an existing file.
    async fn truncate(&self, path: &str, len: u64) -> BackendResult<()>;

    /// Deletes a file or directory.
    ///
    /// Returns `false` if nothing existed at `path`. Non-empty directories require `recursive`.
    async fn delete(&self, path: &str, recursive: bool) -> BackendResult<bool>;

    /// Moves a file or directory, replacing an existing file at the destination.
    ///
    /// Returns `false` if the source does not exist.
    async fn rename(&self, from: &str, to: &str) -> BackendResult<bool>;

    /// Returns `true` if anything exists at `path`.
    async fn exists(&self, path: &str) -> BackendResult<bool>;

    /// Returns the status of a file, directory or symbolic link.
    async fn get_status(&self, path: &str) -> BackendResult<FileStatus>;

    /// Sets the permission bits of a file or directory.
    async fn set_permission(&self, path: &str, mode: u32) -> BackendResult<()>;

    /// Creates a symbolic link at `link` pointing to `target`.
    ///
    /// The link's parent directory is created when `create_parent` is set; otherwise it must exist.
    async fn create_symlink(&self, target: &str, link: &str, create_parent: bool)
    -> BackendResult<()>;

    /// Lists the direct children of a directory, ordered by path.
    async fn list_status(&self, path: &str) -> BackendResult<Vec<FileStatus>>;
}

/// The kind of entry a [`FileStatus`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link. Links are never followed when reporting status.
    Symlink,
}

/// Metadata about an entry in the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    /// The path of the entry, as passed to or derived from the request.
    pub path: String,
    /// What kind of entry this is.
    pub kind: FileKind,
    /// Length in bytes. Always `0` for directories.
    pub len: u64,
    /// Permission bits.
    pub mode: u32,
}

impl FileStatus {
    /// Returns `true` if the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to payload streaming or file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The path, or the parent it needs, does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// An entry exists where a new one was to be created.
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// A path component that must be a directory is something else.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The backend cannot perform the operation on this platform.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl BackendError {
    /// Classifies an IO error raised while accessing `path`.
    pub(crate) fn from_io(path: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_owned()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_owned()),
            std::io::ErrorKind::NotADirectory => Self::NotADirectory(path.to_owned()),
            _ => Self::Io(error),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
