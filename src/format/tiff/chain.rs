//! Main directory chain traversal.
//!
//! The main directories form a singly linked list rooted in the header: the
//! header's first-IFD field points at directory 0, and each directory's
//! trailing next-IFD field points at the one after it. Relocating a main
//! directory means rewriting the one field that points at it, so the walker
//! reports every link as the file position of its pointer together with the
//! value stored there.
//!
//! The on-disk chain is the source of truth. Nothing here is cached; every
//! query re-reads the pointers it needs.

use std::collections::HashSet;

use crate::error::TiffError;
use crate::io::RandomAccessStore;

use super::parser::TiffHeader;

/// Upper bound on the number of main directories walked.
///
/// Real files stay far below this; hitting it means the chain is corrupt in
/// a way the loop check cannot see (e.g. an ever-growing sequence of offsets).
pub const MAX_DIRECTORIES: usize = 1 << 16;

/// One pointer in the main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    /// File position of the pointer field
    pub slot: u64,

    /// Directory that holds the pointer, `None` for the header
    pub owner: Option<u64>,

    /// Value stored in the pointer (0 terminates the chain)
    pub target: u64,
}

impl ChainLink {
    /// Whether this link is the header's first-IFD field.
    pub fn is_header(&self) -> bool {
        self.owner.is_none()
    }
}

/// Walks the main chain of a store.
pub struct ChainWalker<'a, S: RandomAccessStore> {
    store: &'a mut S,
    header: &'a TiffHeader,
}

impl<'a, S: RandomAccessStore> ChainWalker<'a, S> {
    pub fn new(store: &'a mut S, header: &'a TiffHeader) -> Self {
        Self { store, header }
    }

    /// Read the next-IFD pointer of the directory at `offset`.
    ///
    /// Returns the pointer's file position and its value.
    pub async fn read_next(&mut self, offset: u64) -> Result<(u64, u64), TiffError> {
        let header = self.header;
        let count_size = header.ifd_count_size() as u64;
        let file_size = self.store.size();

        let count_end = offset
            .checked_add(count_size)
            .ok_or(TiffError::InvalidIfdOffset(offset))?;
        if offset < header.header_size() as u64 || count_end > file_size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = self.store.read_exact_at(offset, count_size as usize).await?;
        let entry_count = header.read_entry_count(&count_bytes);

        let slot = entry_count
            .checked_mul(header.ifd_entry_size() as u64)
            .and_then(|entries| entries.checked_add(count_end))
            .ok_or(TiffError::InvalidIfdOffset(offset))?;
        let width = header.ifd_next_offset_size();
        if slot.checked_add(width as u64).map_or(true, |end| end > file_size) {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let bytes = self.store.read_exact_at(slot, width).await?;
        Ok((slot, header.read_offset(&bytes)))
    }

    /// Every link from the header to the terminating zero pointer.
    ///
    /// The last link always has `target == 0`; its slot is where a newly
    /// appended directory gets linked. Fails with `ChainLoop` if a directory
    /// is reached twice.
    pub async fn links(&mut self) -> Result<Vec<ChainLink>, TiffError> {
        let mut links = vec![ChainLink {
            slot: self.header.first_ifd_slot(),
            owner: None,
            target: self.header.first_ifd_offset,
        }];
        let mut seen = HashSet::new();
        let mut current = self.header.first_ifd_offset;

        while current != 0 {
            if !seen.insert(current) || seen.len() > MAX_DIRECTORIES {
                return Err(TiffError::ChainLoop(current));
            }

            let (slot, next) = self.read_next(current).await?;
            links.push(ChainLink {
                slot,
                owner: Some(current),
                target: next,
            });
            current = next;
        }

        Ok(links)
    }

    /// Offsets of all main directories in chain order.
    pub async fn offsets(&mut self) -> Result<Vec<u64>, TiffError> {
        Ok(self
            .links()
            .await?
            .into_iter()
            .filter_map(|link| link.owner)
            .collect())
    }

    /// Number of main directories.
    pub async fn count(&mut self) -> Result<usize, TiffError> {
        Ok(self.offsets().await?.len())
    }

    /// Offset of the main directory at `index`.
    pub async fn offset_at(&mut self, index: usize) -> Result<u64, TiffError> {
        let offsets = self.offsets().await?;
        offsets
            .get(index)
            .copied()
            .ok_or(TiffError::DirectoryIndexOutOfRange {
                index,
                count: offsets.len(),
            })
    }

    /// The link that points at `target`, if any.
    pub async fn find_predecessor(&mut self, target: u64) -> Result<Option<ChainLink>, TiffError> {
        Ok(self
            .links()
            .await?
            .into_iter()
            .find(|link| link.target == target))
    }

    /// The terminating link, where the next directory gets appended.
    pub async fn tail(&mut self) -> Result<ChainLink, TiffError> {
        let links = self.links().await?;
        // links() always yields at least the header link
        Ok(links[links.len() - 1])
    }
}

// =============================================================================
// Tests
// =============================================================================
