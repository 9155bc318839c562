use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_web::web::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub(crate) type ArcTmpDir = Arc<TmpDir>;

/// Per-process scratch directory that every staged upload lives in
#[derive(Debug)]
pub(crate) struct TmpDir {
    path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StageError<E> {
    #[error("Error writing staged file")]
    Io(#[source] std::io::Error),

    #[error("Upload exceeded the limit of {0} bytes")]
    TooLarge(usize),

    #[error("Error reading upload")]
    Stream(#[source] E),
}

impl TmpDir {
    pub(crate) async fn init<P: AsRef<Path>>(path: P) -> std::io::Result<Arc<Self>> {
        let path = path.as_ref().join(Uuid::now_v7().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Arc::new(TmpDir { path: Some(path) }))
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub(crate) fn tmp_file(&self, ext: Option<&str>) -> TmpFile {
        let name = match ext {
            Some(ext) => format!("{}{}", Uuid::now_v7(), ext),
            None => Uuid::now_v7().to_string(),
        };

        TmpFile::new(self.path().join(name))
    }

    /// Copy `stream` into a fresh scratch file, giving up once more than `limit` bytes arrive
    ///
    /// The partially written file is removed on every error path.
    #[tracing::instrument(level = "debug", skip(self, stream))]
    pub(crate) async fn stage<S, E>(&self, stream: S, limit: usize) -> Result<TmpFile, StageError<E>>
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let tmp_file = self.tmp_file(Some(".mp4"));

        let mut file = tokio::fs::File::create(&tmp_file)
            .await
            .map_err(StageError::Io)?;

        futures_util::pin_mut!(stream);

        let mut written = 0;

        while let Some(res) = stream.next().await {
            let mut bytes = res.map_err(StageError::Stream)?;

            written += bytes.len();
            if written > limit {
                return Err(StageError::TooLarge(limit));
            }

            file.write_all_buf(&mut bytes)
                .await
                .map_err(StageError::Io)?;
        }

        file.flush().await.map_err(StageError::Io)?;
        drop(file);

        tracing::debug!("Staged {written} bytes");

        Ok(tmp_file)
    }

    pub(crate) async fn cleanup(self: Arc<Self>) -> std::io::Result<()> {
        if let Some(path) = Arc::into_inner(self).and_then(|mut this| this.path.take()) {
            tokio::fs::remove_dir_all(path).await?;
        }

        Ok(())
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!("Failed to remove temporary directory {path:?}: {e}");
            }
        }
    }
}

/// A scratch file owned by a single request
///
/// Dropping an armed `TmpFile` removes it synchronously, so every exit path releases it. Prefer
/// [`TmpFile::cleanup`] on the happy path to avoid blocking the executor.
#[must_use]
#[derive(Debug)]
pub(crate) struct TmpFile {
    path: PathBuf,
    armed: bool,
}

impl TmpFile {
    fn new(path: PathBuf) -> Self {
        TmpFile { path, armed: true }
    }

    /// A new scratch file next to this one, named by appending `suffix`
    pub(crate) fn sibling(&self, suffix: &str) -> TmpFile {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);

        TmpFile::new(PathBuf::from(name))
    }

    pub(crate) async fn cleanup(mut self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        self.armed = false;
        Ok(())
    }
}

impl AsRef<Path> for TmpFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl std::ops::Deref for TmpFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StageError, TmpDir};
    use actix_web::web::Bytes;

    fn chunks(parts: &[&'static str]) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> {
        futures_util::stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn entries(dir: &TmpDir) -> usize {
        std::fs::read_dir(dir.path()).expect("Read dir").count()
    }

    #[tokio::test]
    async fn staged_file_holds_all_bytes() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");

        let staged = dir
            .stage(chunks(&["hello ", "world"]), 1024)
            .await
            .expect("Staged");

        let contents = tokio::fs::read(&staged).await.expect("Read staged file");
        assert_eq!(contents, b"hello world");

        staged.cleanup().await.expect("Cleaned up");
        assert_eq!(entries(&dir), 0);
    }

    #[tokio::test]
    async fn oversized_stream_leaves_nothing_behind() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");

        let res = dir.stage(chunks(&["0123456789", "0123456789"]), 15).await;

        assert!(matches!(res, Err(StageError::TooLarge(15))));
        assert_eq!(entries(&dir), 0);
    }

    #[tokio::test]
    async fn stream_error_leaves_nothing_behind() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");

        let stream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")),
        ]);

        let res = dir.stage(stream, 1024).await;

        assert!(matches!(res, Err(StageError::Stream(_))));
        assert_eq!(entries(&dir), 0);
    }

    #[tokio::test]
    async fn dropping_releases_file() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");

        let staged = dir.stage(chunks(&["bytes"]), 1024).await.expect("Staged");
        let sibling = staged.sibling(".processing");
        std::fs::write(&sibling, b"remuxed").expect("Wrote sibling");

        assert!(sibling.to_string_lossy().ends_with(".mp4.processing"));
        assert_eq!(entries(&dir), 2);

        drop(sibling);
        drop(staged);

        assert_eq!(entries(&dir), 0);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_for_missing_files() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");

        let never_written = dir.tmp_file(None);
        never_written.cleanup().await.expect("Missing file is fine");
    }

    #[tokio::test]
    async fn dir_is_removed_on_cleanup() {
        let base = std::env::temp_dir().join("tubely-tests");
        let dir = TmpDir::init(&base).await.expect("Created tmp dir");
        let path = dir.path().to_owned();

        dir.cleanup().await.expect("Removed dir");

        assert!(!path.exists());
    }
}
