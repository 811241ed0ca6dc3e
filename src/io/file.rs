use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::RandomAccessStore;
use crate::error::IoError;

/// Byte store backed by a local file.
///
/// The file length is cached after open and kept current by `write_at` and
/// `truncate`, so `size()` never touches the filesystem.
pub struct FileStore {
    file: File,
    len: u64,
    identifier: String,
}

impl FileStore {
    /// Open an existing file for reading and writing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            file,
            len,
            identifier: path.display().to_string(),
        })
    }

    /// Create (or truncate) a file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            len: 0,
            identifier: path.display().to_string(),
        })
    }

    /// Flush buffered writes and sync the file to disk.
    pub async fn sync(&mut self) -> Result<(), IoError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl RandomAccessStore for FileStore {
    async fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset.saturating_add(len as u64) > self.len {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.len,
            });
        }

        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    async fn truncate(&mut self, len: u64) -> Result<(), IoError> {
        self.file.flush().await?;
        self.file.set_len(len).await?;
        self.len = len;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
