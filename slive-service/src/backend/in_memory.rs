//! In-memory backend for tests and dry runs.
//!
//! This provides a [`Backend`] backed by an ordered map of normalized paths, removing the need
//! for filesystem tempdir management. The backend is [`Clone`] so tests can hold a handle for
//! direct inspection while executors share another copy.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWrite;

use super::common::{
    Backend, BackendError, BackendResult, FileKind, FileStatus, FileWriter, PayloadStream,
};

const DEFAULT_MODE: u32 = 0o644;
const DIRECTORY_MODE: u32 = 0o755;
const MAX_LINK_DEPTH: usize = 8;

#[derive(Clone, Debug)]
enum Node {
    Directory { mode: u32 },
    File { data: Vec<u8>, mode: u32 },
    Symlink { target: String },
}

type Tree = BTreeMap<String, Node>;

/// A [`Backend`] keeping its whole tree in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    tree: Arc<Mutex<Tree>>,
}

/// Normalizes a path to its `/`-joined components. The root is the empty string.
fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn children_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

fn is_dir(tree: &Tree, path: &str) -> bool {
    path.is_empty() || matches!(tree.get(path), Some(Node::Directory { .. }))
}

fn has_children(tree: &Tree, path: &str) -> bool {
    let prefix = children_prefix(path);
    tree.range(prefix.clone()..)
        .next()
        .is_some_and(|(key, _)| key.starts_with(&prefix))
}

fn mkdirs(tree: &mut Tree, path: &str) -> BackendResult<()> {
    let mut current = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(component);

        match tree.get(&current) {
            None => {
                tree.insert(
                    current.clone(),
                    Node::Directory {
                        mode: DIRECTORY_MODE,
                    },
                );
            }
            Some(Node::Directory { .. }) => {}
            Some(_) => return Err(BackendError::NotADirectory(current)),
        }
    }
    Ok(())
}

/// Follows symbolic links until a non-link path is reached.
fn follow(tree: &Tree, path: String) -> BackendResult<String> {
    let mut current = path;
    for _ in 0..MAX_LINK_DEPTH {
        match tree.get(&current) {
            Some(Node::Symlink { target }) => current = target.clone(),
            _ => return Ok(current),
        }
    }
    Err(BackendError::Io(io::Error::other("too many levels of symbolic links")))
}

fn status(path: &str, node: &Node) -> FileStatus {
    let (kind, len, mode) = match node {
        Node::Directory { mode } => (FileKind::Directory, 0, *mode),
        Node::File { data, mode } => (FileKind::File, data.len() as u64, *mode),
        Node::Symlink { target } => (FileKind::Symlink, target.len() as u64, 0o777),
    };

    FileStatus {
        path: path.to_owned(),
        kind,
        len,
        mode,
    }
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the contents of the file at `path`, if there is one.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().unwrap().get(&normalize(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Returns `true` if anything exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        let path = normalize(path);
        path.is_empty() || self.tree.lock().unwrap().contains_key(&path)
    }

    fn writer(&self, path: String) -> FileWriter {
        Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path,
        })
    }
}

/// Appends every write directly to the file node.
struct MemoryWriter {
    tree: Arc<Mutex<Tree>>,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut tree = self.tree.lock().unwrap();
        match tree.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file `{}` was removed while open", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn mkdirs(&self, path: &str) -> BackendResult<()> {
        mkdirs(&mut self.tree.lock().unwrap(), &normalize(path))
    }

    async fn create(&self, path: &str, overwrite: bool) -> BackendResult<FileWriter> {
        let path = normalize(path);
        {
            let mut tree = self.tree.lock().unwrap();
            mkdirs(&mut tree, parent(&path))?;

            match tree.get(&path) {
                Some(Node::Directory { .. }) => return Err(BackendError::AlreadyExists(path)),
                Some(_) if !overwrite => return Err(BackendError::AlreadyExists(path)),
                _ => {}
            }

            tree.insert(
                path.clone(),
                Node::File {
                    data: Vec::new(),
                    mode: DEFAULT_MODE,
                },
            );
        }

        Ok(self.writer(path))
    }

    async fn append(&self, path: &str) -> BackendResult<FileWriter> {
        let path = {
            let tree = self.tree.lock().unwrap();
            let resolved = follow(&tree, normalize(path))?;
            match tree.get(&resolved) {
                Some(Node::File { .. }) => resolved,
                Some(_) => return Err(BackendError::AlreadyExists(resolved)),
                None => return Err(BackendError::NotFound(path.to_owned())),
            }
        };

        Ok(self.writer(path))
    }

    async fn open(&self, path: &str) -> BackendResult<PayloadStream> {
        let data = {
            let tree = self.tree.lock().unwrap();
            let resolved = follow(&tree, normalize(path))?;
            match tree.get(&resolved) {
                Some(Node::File { data, .. }) => Bytes::from(data.clone()),
                Some(_) => return Err(BackendError::Io(io::Error::other("not a file"))),
                None => return Err(BackendError::NotFound(path.to_owned())),
            }
        };

        Ok(futures_util::stream::once(async move { Ok(data) }).boxed())
    }

    async fn truncate(&self, path: &str, len: u64) -> BackendResult<()> {
        let mut tree = self.tree.lock().unwrap();
        let resolved = follow(&tree, normalize(path))?;
        match tree.get_mut(&resolved) {
            Some(Node::File { data, .. }) => {
                data.resize(len as usize, 0);
                Ok(())
            }
            Some(_) => Err(BackendError::Io(io::Error::other("not a file"))),
            None => Err(BackendError::NotFound(path.to_owned())),
        }
    }

    async fn delete(&self, path: &str, recursive: bool) -> BackendResult<bool> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();

        if !tree.contains_key(&path) {
            return Ok(false);
        }

        if is_dir(&tree, &path) && has_children(&tree, &path) {
            if !recursive {
                return Err(BackendError::Io(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("directory `{path}` is not empty"),
                )));
            }
            let prefix = children_prefix(&path);
            tree.retain(|key, _| !key.starts_with(&prefix));
        }

        tree.remove(&path);
        Ok(true)
    }

    async fn rename(&self, from: &str, to: &str) -> BackendResult<bool> {
        let from = normalize(from);
        let to = normalize(to);
        let mut tree = self.tree.lock().unwrap();

        let Some(node) = tree.remove(&from) else {
            return Ok(false);
        };

        if let Err(error) = mkdirs(&mut tree, parent(&to)) {
            tree.insert(from, node);
            return Err(error);
        }

        let prefix = children_prefix(&from);
        let moved: Vec<_> = tree
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in moved {
            if let Some(child) = tree.remove(&key) {
                tree.insert(format!("{to}/{}", &key[prefix.len()..]), child);
            }
        }
        tree.insert(to, node);
        Ok(true)
    }

    async fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(self.contains(path))
    }

    async fn get_status(&self, path: &str) -> BackendResult<FileStatus> {
        let normalized = normalize(path);
        let tree = self.tree.lock().unwrap();
        match tree.get(&normalized) {
            Some(node) => Ok(status(path, node)),
            None if normalized.is_empty() => Ok(status(
                path,
                &Node::Directory {
                    mode: DIRECTORY_MODE,
                },
            )),
            None => Err(BackendError::NotFound(path.to_owned())),
        }
    }

    async fn set_permission(&self, path: &str, mode: u32) -> BackendResult<()> {
        let mut tree = self.tree.lock().unwrap();
        let resolved = follow(&tree, normalize(path))?;
        match tree.get_mut(&resolved) {
            Some(Node::File { mode: current, .. } | Node::Directory { mode: current }) => {
                *current = mode & 0o7777;
                Ok(())
            }
            _ => Err(BackendError::NotFound(path.to_owned())),
        }
    }

    async fn create_symlink(
        &self,
        target: &str,
        link: &str,
        create_parent: bool,
    ) -> BackendResult<()> {
        let link = normalize(link);
        let mut tree = self.tree.lock().unwrap();

        let link_parent = parent(&link);
        if create_parent {
            mkdirs(&mut tree, link_parent)?;
        } else if !is_dir(&tree, link_parent) {
            return Err(BackendError::NotFound(link_parent.to_owned()));
        }

        if tree.contains_key(&link) {
            return Err(BackendError::AlreadyExists(link));
        }

        tree.insert(
            link,
            Node::Symlink {
                target: normalize(target),
            },
        );
        Ok(())
    }

    async fn list_status(&self, path: &str) -> BackendResult<Vec<FileStatus>> {
        let normalized = normalize(path);
        let tree = self.tree.lock().unwrap();

        if !is_dir(&tree, &normalized) {
            return match tree.get(&normalized) {
                Some(_) => Err(BackendError::NotADirectory(path.to_owned())),
                None => Err(BackendError::NotFound(path.to_owned())),
            };
        }

        let prefix = children_prefix(&normalized);
        let display = path.trim_end_matches('/');
        Ok(tree
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, node)| status(&format!("{display}/{}", &key[prefix.len()..]), node))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures_util::TryStreamExt;
    use tokio::io::AsyncWriteExt;

    use super::*;

    async fn write(backend: &InMemoryBackend, path: &str, contents: &[u8]) {
        let mut writer = backend.create(path, true).await.unwrap();
        writer.write_all(contents).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn creates_parents_on_write() {
        let backend = InMemoryBackend::new();
        write(&backend, "/slive/write/3/file_7", b"oh hai!").await;

        assert!(backend.contains("slive"));
        assert!(backend.contains("slive/write/3"));
        assert_eq!(
            backend.contents("slive/write/3/file_7").unwrap(),
            b"oh hai!"
        );

        let stream = backend.open("slive/write/3/file_7").await.unwrap();
        let read: BytesMut = stream.try_collect().await.unwrap();
        assert_eq!(read.as_ref(), b"oh hai!");
    }

    #[tokio::test]
    async fn files_block_directories() {
        let backend = InMemoryBackend::new();
        write(&backend, "a", b"x").await;

        assert!(matches!(
            backend.mkdirs("a/b").await,
            Err(BackendError::NotADirectory(path)) if path == "a"
        ));
    }

    #[tokio::test]
    async fn appends_and_truncates() {
        let backend = InMemoryBackend::new();
        write(&backend, "file", b"hello").await;

        let mut writer = backend.append("file").await.unwrap();
        writer.write_all(b" world").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(backend.contents("file").unwrap(), b"hello world");

        backend.truncate("file", 5).await.unwrap();
        assert_eq!(backend.contents("file").unwrap(), b"hello");

        assert!(matches!(
            backend.append("missing").await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deletes_recursively() {
        let backend = InMemoryBackend::new();
        write(&backend, "dir/nested/file", b"x").await;
        write(&backend, "dirty", b"x").await;

        assert!(backend.delete("dir", false).await.is_err());
        assert!(backend.delete("dir", true).await.unwrap());
        assert!(!backend.contains("dir/nested/file"));
        assert!(backend.contains("dirty"));
        assert!(!backend.delete("dir", true).await.unwrap());
    }

    #[tokio::test]
    async fn renames_subtrees() {
        let backend = InMemoryBackend::new();
        write(&backend, "src/a/file", b"x").await;

        assert!(backend.rename("src", "moved/dst").await.unwrap());
        assert_eq!(backend.contents("moved/dst/a/file").unwrap(), b"x");
        assert!(!backend.contains("src"));
        assert!(!backend.rename("src", "other").await.unwrap());
    }

    #[tokio::test]
    async fn lists_direct_children() {
        let backend = InMemoryBackend::new();
        write(&backend, "dir/b", b"bb").await;
        write(&backend, "dir/a", b"a").await;
        write(&backend, "dir/sub/deep", b"x").await;

        let listing = backend.list_status("dir").await.unwrap();
        let paths: Vec<_> = listing.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["dir/a", "dir/b", "dir/sub"]);
        assert_eq!(listing[1].len, 2);

        assert!(matches!(
            backend.list_status("nope").await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn symlinks_resolve_on_read() {
        let backend = InMemoryBackend::new();
        write(&backend, "file", b"x").await;

        assert!(matches!(
            backend.create_symlink("file", "links/l", false).await,
            Err(BackendError::NotFound(_))
        ));
        backend.create_symlink("file", "links/l", true).await.unwrap();

        let status = backend.get_status("links/l").await.unwrap();
        assert_eq!(status.kind, FileKind::Symlink);

        let stream = backend.open("links/l").await.unwrap();
        let read: BytesMut = stream.try_collect().await.unwrap();
        assert_eq!(read.as_ref(), b"x");
    }

    #[tokio::test]
    async fn sets_permissions() {
        let backend = InMemoryBackend::new();
        write(&backend, "file", b"x").await;
        assert_eq!(backend.get_status("file").await.unwrap().mode, 0o644);

        backend.set_permission("file", 0o600).await.unwrap();
        assert_eq!(backend.get_status("file").await.unwrap().mode, 0o600);
    }
}
