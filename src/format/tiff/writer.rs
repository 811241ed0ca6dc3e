//! Directory write-back engine.
//!
//! [`TiffWriter`] owns a store and applies directory edits to it. Each commit
//! serializes a [`Directory`], asks the placement rules where it goes, writes
//! it, and repairs whatever pointer has to follow it:
//!
//! - a new main directory is linked at the tail of the main chain,
//! - a relocated main directory gets its predecessor pointer (the header or
//!   the previous directory) rewritten,
//! - a relocated custom or sub-directory cannot be relinked from here, so the
//!   move is reported back as an orphan for the caller to fix up.
//!
//! Relocation always writes the new bytes before touching the pointer, so an
//! interrupted commit leaves the old chain intact.
//!
//! Offsets abandoned by a relocation are remembered for the life of the
//! writer. A `Directory` value that still refers to one of them is stale and
//! refuses to commit.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::TiffError;
use crate::io::RandomAccessStore;

use super::chain::{ChainLink, ChainWalker};
use super::directory::{Directory, DirectoryKind, SubSlot};
use super::parser::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::placement::{decide, Placement, PlacementRequest};
use super::serializer::SerializedDirectory;
use super::strile::{ArrayPolicy, StrileKind};
use super::tags::TiffTag;
use super::values::TagValue;

// =============================================================================
// Public types
// =============================================================================

/// How to pick a main directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLocation {
    /// Position in the main chain, 0 based
    Index(usize),
    /// Absolute file offset
    Offset(u64),
}

/// A custom or sub-directory moved and its referrer still points at the old
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanReport {
    pub old_offset: u64,
    pub new_offset: u64,
}

/// Result of a commit or checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Where the directory lives now
    pub offset: u64,

    /// What the placement engine did
    pub placement: Placement,

    /// Set when a custom or sub-directory moved without anyone relinking it
    pub orphan: Option<OrphanReport>,
}

impl CommitOutcome {
    /// Treat an orphaned relocation as an error.
    pub fn into_strict(self) -> Result<u64, TiffError> {
        match self.orphan {
            Some(orphan) => Err(TiffError::OrphanDirectory {
                old_offset: orphan.old_offset,
                new_offset: orphan.new_offset,
            }),
            None => Ok(self.offset),
        }
    }
}

/// Children created together, waiting for their parent's next commit.
#[derive(Debug)]
struct SubDirectoryBatch {
    id: u64,
    offsets: Vec<Option<u64>>,
}

impl SubDirectoryBatch {
    fn remaining(&self) -> usize {
        self.offsets.iter().filter(|slot| slot.is_none()).count()
    }
}

// =============================================================================
// TiffWriter
// =============================================================================

/// Single-writer handle on a TIFF file.
pub struct TiffWriter<S: RandomAccessStore> {
    store: S,
    header: TiffHeader,
    retired: HashSet<u64>,
    sub_batch: Option<SubDirectoryBatch>,
    next_batch_id: u64,
}

impl<S: RandomAccessStore> TiffWriter<S> {
    /// Start a new file in `store`, discarding anything already in it.
    pub async fn create(
        mut store: S,
        byte_order: ByteOrder,
        is_bigtiff: bool,
    ) -> Result<Self, TiffError> {
        let header = TiffHeader::new(byte_order, is_bigtiff);
        store.truncate(0).await?;
        store.write_at(0, &header.encode()?).await?;

        info!(
            store = store.identifier(),
            bigtiff = is_bigtiff,
            ?byte_order,
            "Created TIFF file"
        );

        Ok(Self::with_header(store, header))
    }

    /// Open an existing file.
    pub async fn open(mut store: S) -> Result<Self, TiffError> {
        let size = store.size();
        if size < TIFF_HEADER_SIZE as u64 {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: size,
            });
        }

        let len = size.min(BIGTIFF_HEADER_SIZE as u64) as usize;
        let bytes = store.read_exact_at(0, len).await?;
        let header = TiffHeader::parse(&bytes, size)?;

        debug!(
            store = store.identifier(),
            bigtiff = header.is_bigtiff,
            first_ifd = header.first_ifd_offset,
            "Opened TIFF file"
        );

        Ok(Self::with_header(store, header))
    }

    fn with_header(store: S, header: TiffHeader) -> Self {
        Self {
            store,
            header,
            retired: HashSet::new(),
            sub_batch: None,
            next_batch_id: 0,
        }
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back, e.g. to sync or inspect it.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Whether `offset` was abandoned by a relocation in this session.
    pub fn is_retired(&self, offset: u64) -> bool {
        self.retired.contains(&offset)
    }

    // -------------------------------------------------------------------------
    // Directory handles
    // -------------------------------------------------------------------------

    /// A new, empty main directory. It joins the chain on its first commit.
    pub fn new_directory(&self) -> Directory {
        Directory::new(DirectoryKind::Main)
    }

    /// A new, empty custom directory (EXIF, GPS, private IFDs).
    ///
    /// The caller stores its offset in the referring tag after committing.
    pub fn create_custom_directory(&self) -> Directory {
        Directory::new(DirectoryKind::Custom)
    }

    /// Open a batch of `count` child directories.
    ///
    /// Each child records its offset on its first commit; the parent's next
    /// commit writes them all to SubIFDs and closes the batch. Only one
    /// batch can be open at a time.
    pub fn create_sub_directories(&mut self, count: usize) -> Result<Vec<Directory>, TiffError> {
        if let Some(batch) = &self.sub_batch {
            return Err(TiffError::SubDirectoriesPending {
                remaining: batch.remaining(),
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let id = self.next_batch_id;
        self.next_batch_id += 1;
        self.sub_batch = Some(SubDirectoryBatch {
            id,
            offsets: vec![None; count],
        });

        Ok((0..count)
            .map(|index| {
                let mut dir = Directory::new(DirectoryKind::Sub);
                dir.sub_slot = Some(SubSlot { batch: id, index });
                dir
            })
            .collect())
    }

    /// Load a main directory by chain index or by offset.
    pub async fn seek_directory(
        &mut self,
        location: DirectoryLocation,
    ) -> Result<Directory, TiffError> {
        let offset = match location {
            DirectoryLocation::Index(index) => {
                ChainWalker::new(&mut self.store, &self.header)
                    .offset_at(index)
                    .await?
            }
            DirectoryLocation::Offset(offset) => offset,
        };
        Directory::load(&mut self.store, &self.header, offset, DirectoryKind::Main).await
    }

    /// Load a custom directory reached through a tag rather than the chain.
    pub async fn read_custom_directory(&mut self, offset: u64) -> Result<Directory, TiffError> {
        Directory::load(&mut self.store, &self.header, offset, DirectoryKind::Custom).await
    }

    /// Number of main directories currently on disk.
    pub async fn directory_count(&mut self) -> Result<usize, TiffError> {
        ChainWalker::new(&mut self.store, &self.header).count().await
    }

    /// Offsets of the main directories in chain order.
    pub async fn directory_offsets(&mut self) -> Result<Vec<u64>, TiffError> {
        ChainWalker::new(&mut self.store, &self.header).offsets().await
    }

    /// Tag value pointing at directories, in the type this file class uses.
    pub fn directory_pointer_value(&self, offsets: &[u64]) -> Result<TagValue, TiffError> {
        if self.header.is_bigtiff {
            return Ok(TagValue::Ifd8(offsets.to_vec()));
        }
        offsets
            .iter()
            .map(|&offset| u32::try_from(offset).map_err(|_| TiffError::OffsetOverflow(offset)))
            .collect::<Result<Vec<_>, _>>()
            .map(TagValue::Ifd)
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Write `directory` and finish it.
    ///
    /// For a main directory this also attaches a completed sub-directory
    /// batch as SubIFDs. Fails with `SubDirectoriesPending` if children of
    /// the open batch have not been committed yet.
    pub async fn commit(&mut self, directory: &mut Directory) -> Result<CommitOutcome, TiffError> {
        self.write_directory(directory, true).await
    }

    /// Write `directory` without finishing it.
    ///
    /// Placement and chain linking behave exactly as in `commit`, but an open
    /// sub-directory batch stays open.
    pub async fn checkpoint(
        &mut self,
        directory: &mut Directory,
    ) -> Result<CommitOutcome, TiffError> {
        self.write_directory(directory, false).await
    }

    async fn write_directory(
        &mut self,
        dir: &mut Directory,
        finish: bool,
    ) -> Result<CommitOutcome, TiffError> {
        if let Some(offset) = dir.disk_offset {
            if self.retired.contains(&offset) {
                return Err(TiffError::StaleDirectoryOffset(offset));
            }
        }

        let attach_batch = finish && dir.kind == DirectoryKind::Main && self.sub_batch.is_some();
        if attach_batch {
            self.attach_sub_directories(dir)?;
        }

        if dir.kind == DirectoryKind::Main {
            if let Some(offset) = dir.disk_offset {
                // Someone may have been linked behind this directory since it was loaded
                let (_, next) = ChainWalker::new(&mut self.store, &self.header)
                    .read_next(offset)
                    .await?;
                dir.next_ifd_offset = next;
            }
        }

        let serialized = SerializedDirectory::serialize(dir, &self.header)?;
        let new_size = serialized.total_size();
        let placement = decide(&PlacementRequest {
            kind: dir.kind,
            disk_offset: dir.disk_offset,
            raw_byte_size: dir.raw_byte_size,
            new_size,
            file_size: self.store.size(),
        });

        // Find the pointer to repair before anything is written
        let link = match (placement, dir.kind) {
            (Placement::Append { .. }, DirectoryKind::Main) => {
                Some(ChainWalker::new(&mut self.store, &self.header).tail().await?)
            }
            (Placement::Relocate { from, .. }, DirectoryKind::Main) => Some(
                ChainWalker::new(&mut self.store, &self.header)
                    .find_predecessor(from)
                    .await?
                    .ok_or(TiffError::PredecessorNotFound(from))?,
            ),
            _ => None,
        };

        let offset = placement.offset();
        let bytes = serialized.finalize(offset)?;
        self.store.write_at(offset, &bytes).await?;

        if let Placement::InPlace {
            truncate_to: Some(end),
            ..
        } = placement
        {
            self.store.truncate(end).await?;
        }

        if let Some(link) = link {
            self.write_link(link, offset).await?;
        }

        let mut orphan = None;
        match placement {
            Placement::Append { offset } => {
                self.retired.remove(&offset);
            }
            Placement::Relocate { from, to } => {
                self.retired.remove(&to);
                self.retired.insert(from);
                if dir.kind != DirectoryKind::Main && !self.owns_sub_slot(dir) {
                    warn!(
                        kind = ?dir.kind,
                        old_offset = from,
                        new_offset = to,
                        "Directory relocated; its referring tag still points at the old offset"
                    );
                    orphan = Some(OrphanReport {
                        old_offset: from,
                        new_offset: to,
                    });
                }
            }
            _ => {}
        }

        dir.disk_offset = Some(offset);
        dir.raw_byte_size = new_size;
        dir.value_spans = serialized.value_spans(offset);

        self.record_sub_slot(dir, offset);
        if attach_batch {
            self.sub_batch = None;
        }

        debug!(
            kind = ?dir.kind,
            offset,
            size = new_size,
            entries = dir.len(),
            checkpoint = !finish,
            "Directory {}",
            placement
        );

        Ok(CommitOutcome {
            offset,
            placement,
            orphan,
        })
    }

    fn attach_sub_directories(&self, dir: &mut Directory) -> Result<(), TiffError> {
        let Some(batch) = &self.sub_batch else {
            return Ok(());
        };

        let remaining = batch.remaining();
        if remaining > 0 {
            return Err(TiffError::SubDirectoriesPending { remaining });
        }

        let offsets: Vec<u64> = batch.offsets.iter().flatten().copied().collect();
        let value = self.directory_pointer_value(&offsets)?;
        dir.set_value(TiffTag::SubIfds, value);
        Ok(())
    }

    fn owns_sub_slot(&self, dir: &Directory) -> bool {
        match (dir.sub_slot, &self.sub_batch) {
            (Some(slot), Some(batch)) => slot.batch == batch.id,
            _ => false,
        }
    }

    fn record_sub_slot(&mut self, dir: &Directory, offset: u64) {
        let Some(slot) = dir.sub_slot else {
            return;
        };
        if let Some(batch) = self.sub_batch.as_mut().filter(|b| b.id == slot.batch) {
            batch.offsets[slot.index] = Some(offset);
        }
    }

    async fn write_link(&mut self, link: ChainLink, target: u64) -> Result<(), TiffError> {
        let bytes = self.header.encode_offset(target)?;
        self.store.write_at(link.slot, &bytes).await?;
        if link.is_header() {
            self.header.first_ifd_offset = target;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Striles
    // -------------------------------------------------------------------------

    /// Reserve zero-filled strile arrays of `count` entries in `directory`.
    pub fn declare_striles(
        &self,
        directory: &mut Directory,
        kind: StrileKind,
        count: usize,
        policy: ArrayPolicy,
    ) -> Result<(), TiffError> {
        directory.declare_striles(kind, count, policy, self.header.is_bigtiff)
    }

    /// Append the data of strile `index` and record its offset and length.
    ///
    /// Returns the offset the data was written at.
    pub async fn write_strile(
        &mut self,
        directory: &mut Directory,
        index: usize,
        data: &[u8],
    ) -> Result<u64, TiffError> {
        let offset = self.store.size();
        directory.record_strile(index, offset, data.len() as u64, self.header.is_bigtiff)?;
        self.store.write_at(offset, data).await?;

        debug!(index, offset, len = data.len(), "Strile written");
        Ok(offset)
    }

    /// Bring the strile arrays on disk up to date according to the policy.
    ///
    /// Deferred arrays are patched in place; immediate ones are committed.
    pub async fn finish_striles(
        &mut self,
        directory: &mut Directory,
    ) -> Result<CommitOutcome, TiffError> {
        match directory.strile_layout.map(|layout| layout.policy) {
            Some(ArrayPolicy::Deferred) => self.patch_strile_arrays(directory).await,
            _ => self.commit(directory).await,
        }
    }

    /// Overwrite the strile arrays at the locations recorded by the last
    /// commit, without moving the directory.
    ///
    /// Fails with `ArraySpanChanged` if the encoded arrays no longer have the
    /// size that was reserved.
    pub async fn patch_strile_arrays(
        &mut self,
        directory: &mut Directory,
    ) -> Result<CommitOutcome, TiffError> {
        let offset = directory.disk_offset.ok_or(TiffError::NotCommitted)?;
        if self.retired.contains(&offset) {
            return Err(TiffError::StaleDirectoryOffset(offset));
        }
        let layout = directory
            .strile_layout
            .ok_or(TiffError::TagNotFound(TiffTag::StripOffsets.as_u16()))?;

        let byte_order = self.header.byte_order;
        let slot_size = self.header.value_offset_size();

        let mut patches = Vec::with_capacity(2);
        for tag in [layout.kind.offsets_tag(), layout.kind.byte_counts_tag()] {
            let span = directory
                .value_span(tag)
                .ok_or(TiffError::TagNotFound(tag.as_u16()))?;
            let mut encoded = directory.value(tag)?.encode(byte_order);
            if encoded.len() as u64 != span.len {
                return Err(TiffError::ArraySpanChanged {
                    tag: tag.as_u16(),
                    reserved: span.len,
                    actual: encoded.len() as u64,
                });
            }
            if span.inline {
                encoded.resize(slot_size, 0);
            }
            patches.push((span.offset, encoded));
        }

        // Both arrays are checked before either is written
        for (at, bytes) in patches {
            self.store.write_at(at, &bytes).await?;
        }

        let placement = Placement::Patched { offset };
        debug!(offset, kind = ?layout.kind, count = layout.count, "Directory {}", placement);

        Ok(CommitOutcome {
            offset,
            placement,
            orphan: None,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
