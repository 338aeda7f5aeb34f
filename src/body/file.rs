//! Uploaded files and the streams that hold them.

use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite};

/// Readable, writable, seekable stream a file field is copied into.
pub trait FileStream: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T> FileStream for T where T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

/// Chooses where each uploaded file is written.
///
/// Called with the field name, the file name and the declared content type.
pub trait FileStreamFactory: Send + Sync {
    fn create(&self, field_name: &str, file_name: &str, content_type: &str) -> io::Result<Box<dyn FileStream>>;
}

impl<F> FileStreamFactory for F
where
    F: Fn(&str, &str, &str) -> io::Result<Box<dyn FileStream>> + Send + Sync,
{
    fn create(&self, field_name: &str, file_name: &str, content_type: &str) -> io::Result<Box<dyn FileStream>> {
        self(field_name, file_name, content_type)
    }
}

/// Keeps every upload in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryFiles;

impl FileStreamFactory for InMemoryFiles {
    fn create(&self, _: &str, _: &str, _: &str) -> io::Result<Box<dyn FileStream>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }
}

/// A file field parsed from a multipart body.
///
/// The stream is positioned at offset 0 when handed out and is released when
/// the `HttpFile` is dropped.
pub struct HttpFile {
    field_name: String,
    file_name: String,
    content_type: String,
    stream: Box<dyn FileStream>,
}

impl HttpFile {
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        stream: Box<dyn FileStream>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            stream,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn stream_mut(&mut self) -> &mut dyn FileStream {
        &mut *self.stream
    }

    pub fn into_stream(self) -> Box<dyn FileStream> {
        self.stream
    }

    /// Read the whole content from the start.
    pub async fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.stream.seek(SeekFrom::Start(0)).await?;
        let mut content = Vec::new();
        self.stream.read_to_end(&mut content).await?;
        Ok(content)
    }

    /// Copy the content to `path`, creating parent directories.
    pub async fn save(&mut self, path: impl AsRef<Path>, overwrite: bool) -> io::Result<u64> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !overwrite && tokio::fs::try_exists(path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }

        self.stream.seek(SeekFrom::Start(0)).await?;
        let mut out = tokio::fs::File::create(path).await?;
        let written = tokio::io::copy(&mut *self.stream, &mut out).await?;
        tracing::debug!(path = %path.display(), bytes = written, "Upload saved");
        Ok(written)
    }
}

impl fmt::Debug for HttpFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFile")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
