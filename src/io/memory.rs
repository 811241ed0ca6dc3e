use async_trait::async_trait;
use bytes::Bytes;

use super::RandomAccessStore;
use crate::error::IoError;

/// In-memory byte store.
///
/// Used for building files before they hit disk and throughout the test
/// suite, where inspecting the raw bytes after a commit is the whole point.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
    identifier: String,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            identifier: "memory://".to_string(),
        }
    }

    /// Wrap existing file contents.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            identifier: "memory://".to_string(),
        }
    }

    /// Borrow the current contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the contents as an immutable buffer.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }
}

#[async_trait]
impl RandomAccessStore for MemoryStore {
    async fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let start = offset as usize;
        let end = start.checked_add(len);
        match end {
            Some(end) if offset <= usize::MAX as u64 && end <= self.data.len() => {
                Ok(Bytes::copy_from_slice(&self.data[start..end]))
            }
            _ => Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            }),
        }
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    async fn truncate(&mut self, len: u64) -> Result<(), IoError> {
        self.data.resize(len as usize, 0);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
