use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for random-access, writable byte storage.
///
/// This is the only surface the directory engine touches: it reads and writes
/// byte ranges at explicit offsets, shrinks the file, and asks for the current
/// end of file. Sequencing is the caller's job; implementations are not
/// expected to be shared between concurrent writers.
#[async_trait]
pub trait RandomAccessStore: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Write `data` at `offset`, extending the store when writing past the end.
    ///
    /// A gap between the current end and `offset` is zero filled.
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError>;

    /// Shrink (or zero-extend) the store to exactly `len` bytes.
    async fn truncate(&mut self, len: u64) -> Result<(), IoError>;

    /// Current size of the store in bytes (the end-of-file watermark).
    fn size(&self) -> u64;

    /// Identifier for logging, e.g. a file path.
    fn identifier(&self) -> &str;
}

/// Round an offset or length up to the next even value.
///
/// Every directory and every out-of-line value starts on a word boundary.
/// Saturates at `u64::MAX`.
#[inline]
pub(crate) const fn round_up_even(value: u64) -> u64 {
    value.saturating_add(value & 1)
}
