//! Seekable byte sources with a known length.

use std::io::{self, Cursor, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

use axum::body::Bytes;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Anything a range response can be served from.
pub trait ByteSource: AsyncRead + AsyncSeek + Send + Unpin {
    /// Total size in bytes. Must not change while serving.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Modification time, when the source has one.
    fn last_modified(&self) -> Option<SystemTime>;
}

/// Wraps a reader with its size and modification time.
#[derive(Debug)]
pub struct KnownSize<R> {
    inner: R,
    len: u64,
    last_modified: Option<SystemTime>,
}

impl<R> KnownSize<R> {
    pub fn new(inner: R, len: u64, last_modified: Option<SystemTime>) -> Self {
        Self {
            inner,
            len,
            last_modified,
        }
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl KnownSize<tokio::fs::File> {
    /// Open a file, taking size and modification time from its metadata.
    pub async fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;
        Ok(Self::new(file, metadata.len(), metadata.modified().ok()))
    }
}

impl KnownSize<Cursor<Bytes>> {
    /// In-memory source. Has no modification time.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::new(Cursor::new(data), len, None)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for KnownSize<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for KnownSize<R> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

impl<R> ByteSource for KnownSize<R>
where
    R: AsyncRead + AsyncSeek + Send + Unpin,
{
    fn len(&self) -> u64 {
        self.len
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    #[tokio::test]
    async fn test_file_source_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut source = KnownSize::file(&path).await.unwrap();
        assert_eq!(source.len(), 10);
        assert!(source.last_modified().is_some());

        source.seek(SeekFrom::Start(7)).await.unwrap();
        let mut rest = String::new();
        source.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "789");
    }

    #[test]
    fn test_bytes_source_has_no_timestamp() {
        let source = KnownSize::bytes("abc");
        assert_eq!(source.len(), 3);
        assert!(source.last_modified().is_none());
    }
}
