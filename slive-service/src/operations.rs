use futures_util::TryStreamExt;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendError, BackendResult, FileWriter};
use crate::catalog::{MissingReadPolicy, Outcome, Target, namespace};
use crate::payload::Payload;

/// Bytes added by a single `append`.
pub const APPEND_SIZE: u64 = 1024;
/// Bytes added per iteration of `append_truncate`.
pub const APPEND_TRUNCATE_CHUNK: u64 = 512;
/// Number of append-then-truncate rounds per `append_truncate`.
pub const APPEND_TRUNCATE_ITERATIONS: usize = 10;
/// Length every `append_truncate` round truncates its file to.
pub const APPEND_TRUNCATE_LENGTH: u64 = 500;
/// Permission bits applied by `set_permission`.
pub const FILE_PERMISSION: u32 = 0o644;

async fn write_payload(writer: &mut FileWriter, mut payload: Payload) -> BackendResult<()> {
    tokio::io::copy(&mut payload, writer).await?;
    writer.flush().await?;
    Ok(())
}

pub(crate) async fn mkdir(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.dir_path(namespace::MKDIR);
    target.backend().mkdirs(&path).await?;
    Ok(Outcome::Completed)
}

pub(crate) async fn write(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    let mut writer = target.backend().create(&path, true).await?;
    write_payload(&mut writer, target.payload(target.file_size())).await?;
    writer.shutdown().await?;

    tracing::trace!(path, bytes = target.file_size(), "wrote file");
    Ok(Outcome::Completed)
}

pub(crate) async fn read(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    let mut stream = match target.backend().open(&path).await {
        Ok(stream) => stream,
        Err(BackendError::NotFound(_)) if target.missing_read() == MissingReadPolicy::Skip => {
            tracing::debug!(path, "skipping read of missing file");
            return Ok(Outcome::Skipped);
        }
        Err(error) => return Err(error),
    };

    let mut bytes = 0;
    while let Some(chunk) = stream.try_next().await? {
        bytes += chunk.len();
    }

    tracing::trace!(path, bytes, "read file");
    Ok(Outcome::Completed)
}

pub(crate) async fn delete_file(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    let deleted = target.backend().delete(&path, false).await?;
    tracing::trace!(path, deleted, "deleted file");
    Ok(Outcome::Completed)
}

pub(crate) async fn delete_dir(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.dir_path(namespace::MKDIR);
    let deleted = target.backend().delete(&path, true).await?;
    tracing::trace!(path, deleted, "deleted directory");
    Ok(Outcome::Completed)
}

pub(crate) async fn list(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.task_dir(namespace::WRITE);
    let entries = target.backend().list_status(&path).await?;
    tracing::trace!(path, entries = entries.len(), "listed directory");
    Ok(Outcome::Completed)
}

pub(crate) async fn rename(target: &Target<'_>) -> BackendResult<Outcome> {
    let from = target.file_path(namespace::WRITE);
    let to = target.path(namespace::WRITE, &format!("file_renamed_{}", target.index()));
    let renamed = target.backend().rename(&from, &to).await?;
    tracing::trace!(from, to, renamed, "renamed file");
    Ok(Outcome::Completed)
}

pub(crate) async fn get_file_status(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    target.backend().get_status(&path).await?;
    Ok(Outcome::Completed)
}

pub(crate) async fn exists(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    let exists = target.backend().exists(&path).await?;
    tracing::trace!(path, exists, "checked existence");
    Ok(Outcome::Completed)
}

pub(crate) async fn set_permission(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    target
        .backend()
        .set_permission(&path, FILE_PERMISSION)
        .await?;
    Ok(Outcome::Completed)
}

pub(crate) async fn append(target: &Target<'_>) -> BackendResult<Outcome> {
    let path = target.file_path(namespace::WRITE);
    let mut writer = target.backend().append(&path).await?;
    write_payload(&mut writer, target.payload(APPEND_SIZE)).await?;
    writer.shutdown().await?;
    Ok(Outcome::Completed)
}

pub(crate) async fn create_symlink(target: &Target<'_>) -> BackendResult<Outcome> {
    let file = target.file_path(namespace::WRITE);
    let link = target.link_path();
    target.backend().create_symlink(&file, &link, true).await?;
    Ok(Outcome::Completed)
}

/// Seeds the file if needed, then runs the append-then-truncate rounds.
///
/// Each round opens the file for appending, writes a chunk, closes it and truncates the file to
/// [`APPEND_TRUNCATE_LENGTH`] bytes. The first round reuses the handle that created or opened the
/// file.
pub(crate) async fn append_truncate(target: &Target<'_>) -> BackendResult<Outcome> {
    let backend = target.backend();
    let parent = target.task_dir(namespace::APPEND_TRUNCATE);
    if !backend.exists(&parent).await? {
        backend.mkdirs(&parent).await?;
    }

    let path = target.file_path(namespace::APPEND_TRUNCATE);
    let mut writer = if backend.exists(&path).await? {
        backend.append(&path).await?
    } else {
        let mut writer = backend.create(&path, true).await?;
        write_payload(&mut writer, target.payload(APPEND_SIZE)).await?;
        writer
    };

    for round in 0..APPEND_TRUNCATE_ITERATIONS {
        if round > 0 {
            writer = backend.append(&path).await?;
        }

        write_payload(&mut writer, target.payload(APPEND_TRUNCATE_CHUNK)).await?;
        writer.shutdown().await?;
        backend.truncate(&path, APPEND_TRUNCATE_LENGTH).await?;
    }

    Ok(Outcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, FileKind, InMemoryBackend};
    use crate::payload::PayloadSource;

    fn target<'a>(
        backend: &'a InMemoryBackend,
        payloads: &'a PayloadSource,
        index: u64,
    ) -> Target<'a> {
        Target {
            backend,
            base_dir: "/slive",
            task_id: 0,
            index,
            file_size: 2048,
            payloads,
            missing_read: MissingReadPolicy::Error,
        }
    }

    #[tokio::test]
    async fn write_then_file_operations() {
        let backend = InMemoryBackend::new();
        let payloads = PayloadSource::new(1);
        let target = target(&backend, &payloads, 4);

        write(&target).await.unwrap();
        assert_eq!(backend.contents("slive/write/0/file_4").unwrap().len(), 2048);

        assert_eq!(read(&target).await.unwrap(), Outcome::Completed);
        append(&target).await.unwrap();
        assert_eq!(
            backend.contents("slive/write/0/file_4").unwrap().len(),
            2048 + APPEND_SIZE as usize
        );

        set_permission(&target).await.unwrap();
        get_file_status(&target).await.unwrap();
        exists(&target).await.unwrap();
        list(&target).await.unwrap();

        create_symlink(&target).await.unwrap();
        let status = backend.get_status("slive/link_0/link_4").await.unwrap();
        assert_eq!(status.kind, FileKind::Symlink);

        rename(&target).await.unwrap();
        assert!(backend.contains("slive/write/0/file_renamed_4"));
        assert!(!backend.contains("slive/write/0/file_4"));
    }

    #[tokio::test]
    async fn mkdir_and_delete_dir() {
        let backend = InMemoryBackend::new();
        let payloads = PayloadSource::new(1);
        let target = target(&backend, &payloads, 3);

        mkdir(&target).await.unwrap();
        assert!(backend.contains("slive/mkdir/0/dir_3"));

        delete_dir(&target).await.unwrap();
        assert!(!backend.contains("slive/mkdir/0/dir_3"));

        // Deleting what is not there is not a failure.
        assert_eq!(delete_dir(&target).await.unwrap(), Outcome::Completed);
        assert_eq!(delete_file(&target).await.unwrap(), Outcome::Completed);
    }

    #[tokio::test]
    async fn read_of_missing_file() {
        let backend = InMemoryBackend::new();
        let payloads = PayloadSource::new(1);
        let mut target = target(&backend, &payloads, 9);

        assert!(matches!(
            read(&target).await,
            Err(BackendError::NotFound(_))
        ));

        target.missing_read = MissingReadPolicy::Skip;
        assert_eq!(read(&target).await.unwrap(), Outcome::Skipped);
    }

    #[tokio::test]
    async fn append_truncate_leaves_truncated_file() {
        let backend = InMemoryBackend::new();
        let payloads = PayloadSource::new(1);
        let target = target(&backend, &payloads, 0);

        append_truncate(&target).await.unwrap();
        let path = "slive/append_truncate/0/file_0";
        assert_eq!(
            backend.contents(path).unwrap().len(),
            APPEND_TRUNCATE_LENGTH as usize
        );

        // A second run starts from the existing file.
        append_truncate(&target).await.unwrap();
        assert_eq!(
            backend.contents(path).unwrap().len(),
            APPEND_TRUNCATE_LENGTH as usize
        );
    }

    #[tokio::test]
    async fn append_to_missing_file_fails() {
        let backend = InMemoryBackend::new();
        let payloads = PayloadSource::new(1);
        let target = target(&backend, &payloads, 0);

        assert!(append(&target).await.is_err());
        assert!(get_file_status(&target).await.is_err());
        assert!(list(&target).await.is_err());
    }
}
