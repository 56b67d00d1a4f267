//! Temp artifacts: one private scratch directory per operation.
//!
//! Every operation opens a [`Scratch`], a uniquely named directory under the
//! configured scratch root (`<root>/<op>_XXXXXX`). Everything the operation
//! touches lives inside it: the inputs it materialises, the outputs it asks a
//! tool to write, and whatever side files the tool leaves behind. Names
//! inside the directory are fixed (`in.pdf`, `out.pdf`, `page_001`, ...);
//! uniqueness comes from the directory alone.
//!
//! The directory goes away as a whole, contents included:
//!
//! * normally through [`Scratch::release`], awaited by the operation on every
//!   exit path before it returns its result;
//! * otherwise when the [`TempDir`] drops, which covers a panic or a caller
//!   dropping the operation future mid-flight.
//!
//! Removal errors are logged and swallowed so they can never replace the
//! operation's own result.

use crate::error::MassageError;
use crate::pipeline::input::Source;
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Private working directory of one operation.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create `<root>/<prefix>_XXXXXX`.
    pub fn new(root: &Path, prefix: &str) -> Result<Self, MassageError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}_"))
            .tempdir_in(root)
            .map_err(|e| io_failure("create scratch directory in", root, e))?;
        debug!("Opened scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// The directory itself; tools that write side files run from here.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `<scratch>/<name>`. Nothing is created.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `source` to `<scratch>/<name>` and return the path.
    pub async fn materialize(&self, source: Source, name: &str) -> Result<PathBuf, MassageError> {
        let path = self.file(name);
        write_source(source, &path).await?;
        Ok(path)
    }

    /// Remove the directory and everything in it.
    ///
    /// Removal runs on the blocking pool and owns the directory from the
    /// start, so dropping this future part-way does not leak anything.
    pub async fn release(self) {
        let Scratch { dir } = self;
        let path = dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(result) => report_removal(&path, result),
            Err(e) => warn!("Cleanup of {} did not finish: {}", path.display(), e),
        }
    }
}

/// Unlink each path, tolerating ones that are already gone.
///
/// Safe to call repeatedly on the same paths.
pub async fn release(paths: &[PathBuf]) {
    for path in paths {
        report_removal(path, tokio::fs::remove_file(path).await);
    }
}

fn report_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Already gone: {}", path.display())
        }
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Write a source to `path`, returning only once every byte is on disk and
/// the file handle is closed.
///
/// A stream error or a write error both fail the call; the partial file is
/// removed with the owning [`Scratch`].
pub async fn write_source(source: Source, path: &Path) -> Result<(), MassageError> {
    match source {
        Source::Bytes(bytes) => tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| io_failure("write", path, e)),
        Source::Stream(mut chunks) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .map_err(|e| io_failure("create", path, e))?;
            let mut written = 0usize;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| io_failure("read input stream for", path, e))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| io_failure("write", path, e))?;
                written += chunk.len();
            }
            file.flush().await.map_err(|e| io_failure("flush", path, e))?;
            file.sync_all()
                .await
                .map_err(|e| io_failure("sync", path, e))?;
            drop(file);
            debug!("Streamed {} bytes to {}", written, path.display());
            Ok(())
        }
    }
}

/// Read back a file a tool produced.
pub async fn read_artifact(path: &Path) -> Result<Vec<u8>, MassageError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| io_failure("read", path, e))
}

pub(crate) fn io_failure(action: &str, path: &Path, e: io::Error) -> MassageError {
    warn!("Failed to {} {}: {}", action, path.display(), e);
    MassageError::ProcessingFailure
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn scopes_get_distinct_prefixed_directories() {
        let root = TempDir::new().unwrap();
        let a = Scratch::new(root.path(), "merge").unwrap();
        let b = Scratch::new(root.path(), "merge").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), Some(root.path()));
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("merge_"), "got {name}");
        assert_eq!(a.file("in1.pdf"), a.path().join("in1.pdf"));
    }

    #[test]
    fn missing_root_is_processing_failure() {
        let root = TempDir::new().unwrap();
        let err = Scratch::new(&root.path().join("absent"), "rotate").unwrap_err();
        assert_eq!(err, MassageError::ProcessingFailure);
    }

    #[tokio::test]
    async fn release_removes_everything_including_untracked_files() {
        let root = TempDir::new().unwrap();
        let scratch = Scratch::new(root.path(), "burst").unwrap();
        let input = scratch
            .materialize(Source::Bytes(b"abc".to_vec()), "in.pdf")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&input).unwrap(), b"abc");
        // what a tool might leave behind
        std::fs::write(scratch.file("doc_data.txt"), b"log").unwrap();
        std::fs::create_dir(scratch.file("nested")).unwrap();
        std::fs::write(scratch.file("nested/page_001"), b"p").unwrap();

        scratch.release().await;
        assert!(listing(root.path()).is_empty());
    }

    #[tokio::test]
    async fn dropped_scope_cleans_up() {
        let root = TempDir::new().unwrap();
        {
            let scratch = Scratch::new(root.path(), "burst").unwrap();
            scratch
                .materialize(Source::Bytes(vec![1]), "in.pdf")
                .await
                .unwrap();
            std::fs::write(scratch.file("page_001"), b"p").unwrap();
        }
        assert!(listing(root.path()).is_empty());
    }

    #[tokio::test]
    async fn dropping_an_unfinished_release_still_cleans_up() {
        let root = TempDir::new().unwrap();
        let scratch = Scratch::new(root.path(), "merge").unwrap();
        std::fs::write(scratch.file("in1.pdf"), b"a").unwrap();
        std::fs::write(scratch.file("in2.pdf"), b"b").unwrap();

        let pending = scratch.release();
        drop(pending);
        assert!(listing(root.path()).is_empty());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("gone");
        std::fs::write(&p, b"x").unwrap();
        release(&[p.clone()]).await;
        release(&[p.clone()]).await;
        assert!(!p.exists());
    }

    #[tokio::test]
    async fn stream_is_written_completely() {
        let tmp = TempDir::new().unwrap();
        let chunks = stream::iter(vec![Ok::<_, io::Error>(b"he".to_vec()), Ok(b"llo".to_vec())]);
        let path = tmp.path().join("s");
        write_source(Source::Stream(Box::pin(chunks)), &path)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn stream_error_fails_materialize_and_is_cleaned() {
        let root = TempDir::new().unwrap();
        let chunks = stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let scratch = Scratch::new(root.path(), "merge").unwrap();
        let err = scratch
            .materialize(Source::Stream(Box::pin(chunks)), "in1.pdf")
            .await
            .unwrap_err();
        assert_eq!(err, MassageError::ProcessingFailure);
        scratch.release().await;
        assert!(listing(root.path()).is_empty());
    }

    #[tokio::test]
    async fn read_missing_artifact_is_processing_failure() {
        let tmp = TempDir::new().unwrap();
        let err = read_artifact(&tmp.path().join("nope")).await.unwrap_err();
        assert_eq!(err, MassageError::ProcessingFailure);
    }
}
