use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::{self, AsyncRead, AsyncSeek};

/// A readable, seekable handle onto blob content.
pub trait AsyncReadSeek: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T> AsyncReadSeek for T where T: AsyncRead + AsyncSeek + Unpin + Send {}

/// Content to be saved as a blob.
///
/// Every call to [`BlobSource::open`] must return a fresh handle positioned at
/// the start of the content, independent of any other handle. Uploads open one
/// handle per attempt and per part, so handles are never shared between
/// concurrent reads at different offsets.
#[async_trait::async_trait]
pub trait BlobSource: fmt::Debug + Send + Sync {
    /// Total length of the content in bytes.
    fn len(&self) -> u64;

    /// Whether the content is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open an independent handle at the start of the content.
    async fn open(&self) -> io::Result<Box<dyn AsyncReadSeek>>;
}

#[async_trait::async_trait]
impl BlobSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn open(&self) -> io::Result<Box<dyn AsyncReadSeek>> {
        Ok(Box::new(Cursor::new(self.clone())))
    }
}

/// Blob content backed by a file on the local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Utf8PathBuf,
    len: u64,
}

impl FileSource {
    /// Open a file source, recording the file's current length.
    pub async fn new(path: impl Into<Utf8PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let len = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, len })
    }

    /// The path to the file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl BlobSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn open(&self) -> io::Result<Box<dyn AsyncReadSeek>> {
        tracing::trace!(path=%self.path, "opening blob source");
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{SeekFrom, Write as _};

    use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

    use super::*;

    #[tokio::test]
    async fn bytes_handles_are_independent() {
        let source = Bytes::from_static(b"0123456789");
        assert_eq!(BlobSource::len(&source), 10);

        let mut first = source.open().await.unwrap();
        first.seek(SeekFrom::Start(5)).await.unwrap();

        let mut second = source.open().await.unwrap();
        let mut buf = String::new();
        second.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "0123456789");

        let mut rest = String::new();
        first.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "56789");
    }

    #[tokio::test]
    async fn file_source_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"layer contents").unwrap();
        file.flush().unwrap();

        let path = Utf8PathBuf::from_path_buf(file.path().to_owned()).unwrap();
        let source = FileSource::new(path).await.unwrap();
        assert_eq!(source.len(), 14);
        assert!(!source.is_empty());

        let mut handle = source.open().await.unwrap();
        let mut buf = String::new();
        handle.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "layer contents");
    }
}
