use std::fs::Metadata;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::BufWriter;
use tokio_util::io::ReaderStream;

use super::common::{
    Backend, BackendError, BackendResult, FileKind, FileStatus, FileWriter, PayloadStream,
};

/// A [`Backend`] that maps paths onto a directory of the local filesystem.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    /// Creates a backend rooted at `path`. The directory is created lazily.
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.path.join(path.trim_start_matches('/'))
    }

    async fn create_parent(&self, full: &Path) -> std::io::Result<()> {
        match full.parent() {
            Some(parent) => tokio::fs::create_dir_all(parent).await,
            None => Ok(()),
        }
    }
}

fn status(path: String, metadata: &Metadata) -> FileStatus {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    };

    FileStatus {
        path,
        kind,
        len: if kind == FileKind::Directory {
            0
        } else {
            metadata.len()
        },
        mode: mode(metadata),
    }
}

#[cfg(unix)]
fn mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[async_trait::async_trait]
impl Backend for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn mkdirs(&self, path: &str) -> BackendResult<()> {
        tokio::fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    async fn create(&self, path: &str, overwrite: bool) -> BackendResult<FileWriter> {
        let full = self.resolve(path);
        self.create_parent(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))?;

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options
            .open(full)
            .await
            .map_err(|e| BackendError::from_io(path, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    async fn append(&self, path: &str) -> BackendResult<FileWriter> {
        let file = OpenOptions::new()
            .append(true)
            .open(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    async fn open(&self, path: &str) -> BackendResult<PayloadStream> {
        let file = OpenOptions::new()
            .read(true)
            .open(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))?;

        Ok(ReaderStream::new(file).boxed())
    }

    async fn truncate(&self, path: &str, len: u64) -> BackendResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))?;
        file.set_len(len).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> BackendResult<bool> {
        let full = self.resolve(path);
        let metadata = match tokio::fs::symlink_metadata(&full).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let result = if !metadata.is_dir() {
            tokio::fs::remove_file(&full).await
        } else if recursive {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_dir(&full).await
        };

        match result {
            Ok(()) => Ok(true),
            // Lost a race against a concurrent delete.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> BackendResult<bool> {
        let source = self.resolve(from);
        if !tokio::fs::try_exists(&source).await? {
            return Ok(false);
        }

        let destination = self.resolve(to);
        self.create_parent(&destination)
            .await
            .map_err(|e| BackendError::from_io(to, e))?;

        match tokio::fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn get_status(&self, path: &str) -> BackendResult<FileStatus> {
        let metadata = tokio::fs::symlink_metadata(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))?;
        Ok(status(path.to_owned(), &metadata))
    }

    #[cfg(unix)]
    async fn set_permission(&self, path: &str, mode: u32) -> BackendResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let permissions = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(self.resolve(path), permissions)
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    #[cfg(not(unix))]
    async fn set_permission(&self, path: &str, mode: u32) -> BackendResult<()> {
        let full = self.resolve(path);
        let mut permissions = tokio::fs::metadata(&full)
            .await
            .map_err(|e| BackendError::from_io(path, e))?
            .permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        Ok(tokio::fs::set_permissions(full, permissions).await?)
    }

    #[cfg(unix)]
    async fn create_symlink(
        &self,
        target: &str,
        link: &str,
        create_parent: bool,
    ) -> BackendResult<()> {
        let full = self.resolve(link);
        if create_parent {
            self.create_parent(&full)
                .await
                .map_err(|e| BackendError::from_io(link, e))?;
        }

        tokio::fs::symlink(self.resolve(target), full)
            .await
            .map_err(|e| BackendError::from_io(link, e))
    }

    #[cfg(not(unix))]
    async fn create_symlink(
        &self,
        _target: &str,
        _link: &str,
        _create_parent: bool,
    ) -> BackendResult<()> {
        Err(BackendError::Unsupported("symbolic links"))
    }

    async fn list_status(&self, path: &str) -> BackendResult<Vec<FileStatus>> {
        let mut entries = tokio::fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(path, e))?;

        let prefix = path.trim_end_matches('/');
        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name();
            let child = format!("{prefix}/{}", name.to_string_lossy());
            listing.push(status(child, &metadata));
        }

        listing.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listing)
    }
}
