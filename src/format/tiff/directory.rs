//! Image File Directory model.
//!
//! Two views of a directory live here:
//!
//! - [`RawIfd`] / [`IfdEntry`]: the on-disk entry block exactly as stored,
//!   with value slots still undecoded. The chain walker and validator work on
//!   this view because they only need counts, slots and next pointers.
//! - [`Directory`]: the editable, decoded form. It remembers where it was last
//!   written (`disk_offset`) and how many bytes it owns there
//!   (`raw_byte_size`), which is what the placement engine needs to decide
//!   between rewriting in place and relocating.
//!
//! # IFD Structure
//!
//! ```text
//! Classic:  count (2) | entries (12 each) | next IFD offset (4)
//! BigTIFF:  count (8) | entries (20 each) | next IFD offset (8)
//! Entry:    tag (2) | type (2) | count (4/8) | value or offset (4/8)
//! ```

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::TiffError;
use crate::io::{round_up_even, RandomAccessStore};

use super::parser::TiffHeader;
use super::strile::StrileLayout;
use super::tags::FieldType;
use super::values::{TagValue, ValueReader};

// =============================================================================
// IfdEntry (on-disk view)
// =============================================================================

/// A single entry as stored in an IFD, value slot undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Tag identifier
    pub tag_id: u16,

    /// Parsed field type, `None` for codes the format does not define
    pub field_type: Option<FieldType>,

    /// Raw field type code
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// The value/offset slot (4 bytes classic, 8 bytes BigTIFF)
    pub value_offset_bytes: Vec<u8>,

    /// Whether the slot holds the value itself rather than an offset
    pub is_inline: bool,
}

impl IfdEntry {
    /// Parse one entry from `ifd_entry_size()` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than `header.ifd_entry_size()`.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let tag_id = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, slot) = if header.is_bigtiff {
            (byte_order.read_u64(&bytes[4..12]), &bytes[12..20])
        } else {
            (byte_order.read_u32(&bytes[4..8]) as u64, &bytes[8..12])
        };

        let is_inline = field_type.is_some_and(|ty| ty.fits_inline(count, header.is_bigtiff));

        IfdEntry {
            tag_id,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes: slot.to_vec(),
            is_inline,
        }
    }

    /// Total byte size of the value, `None` for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type.and_then(|ty| ty.byte_len(self.count))
    }

    /// Interpret the slot as an offset.
    pub fn value_offset(&self, header: &TiffHeader) -> u64 {
        header.read_offset(&self.value_offset_bytes)
    }
}

// =============================================================================
// RawIfd
// =============================================================================

/// An IFD entry block as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIfd {
    /// File offset of the IFD
    pub offset: u64,

    /// Entries in on-disk order
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD (0 at the end of a chain)
    pub next_ifd_offset: u64,
}

impl RawIfd {
    /// Size in bytes of an IFD block with `entry_count` entries.
    ///
    /// Fails with `InvalidIfdOffset(offset)` when the count is too large to
    /// address.
    pub fn calculate_size(
        entry_count: u64,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<u64, TiffError> {
        header
            .ifd_block_size(entry_count)
            .ok_or(TiffError::InvalidIfdOffset(offset))
    }

    /// Parse a complete entry block.
    pub fn parse(bytes: &[u8], offset: u64, header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_count = header.read_entry_count(bytes);
        let needed = Self::calculate_size(entry_count, header, offset)?;
        if (bytes.len() as u64) < needed {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_size = header.ifd_entry_size();
        let entries = bytes[count_size..]
            .chunks_exact(entry_size)
            .take(entry_count as usize)
            .map(|chunk| IfdEntry::parse(chunk, header))
            .collect();

        let next_pos = needed as usize - header.ifd_next_offset_size();
        let next_ifd_offset = header.read_offset(&bytes[next_pos..]);

        Ok(RawIfd {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    /// Read the entry block at `offset`: the count first, then the rest.
    pub async fn read<S: RandomAccessStore>(
        store: &mut S,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size() as u64;
        let file_size = store.size();
        let fits = |len: u64| offset.checked_add(len).is_some_and(|end| end <= file_size);
        if offset < header.header_size() as u64 || !fits(count_size) {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = store.read_exact_at(offset, count_size as usize).await?;
        let entry_count = header.read_entry_count(&count_bytes);

        let size = Self::calculate_size(entry_count, header, offset)?;
        if !fits(size) {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let bytes = store.read_exact_at(offset, size as usize).await?;
        Self::parse(&bytes, offset, header)
    }

    /// Size of the entry block in bytes.
    pub fn block_size(&self, header: &TiffHeader) -> u64 {
        header
            .ifd_block_size(self.entries.len() as u64)
            .unwrap_or(u64::MAX)
    }

    /// Out-of-line value spans `(tag, offset, len)`.
    pub fn out_of_line_spans(&self, header: &TiffHeader) -> Vec<(u16, u64, u64)> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_inline)
            .filter_map(|entry| {
                entry
                    .value_byte_size()
                    .map(|len| (entry.tag_id, entry.value_offset(header), len))
            })
            .collect()
    }

    /// Bytes this directory owns at its offset: the entry block plus every
    /// out-of-line value packed directly behind it.
    ///
    /// Values are allowed to be separated by the single alignment pad byte.
    /// The first gap ends the footprint; values beyond it are not owned and
    /// will never be overwritten by an in-place rewrite.
    pub fn footprint(&self, header: &TiffHeader) -> u64 {
        let mut end = self.offset.saturating_add(self.block_size(header));

        let mut spans: Vec<(u64, u64)> = self
            .out_of_line_spans(header)
            .into_iter()
            .map(|(_, offset, len)| (offset, len))
            .filter(|&(offset, _)| offset >= self.offset)
            .collect();
        spans.sort_unstable();

        for (offset, len) in spans {
            if offset <= round_up_even(end) {
                end = end.max(offset.saturating_add(len));
            } else {
                break;
            }
        }

        end - self.offset
    }
}

// =============================================================================
// Directory (editable view)
// =============================================================================

/// How a directory is reached, which decides who owns the link to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryKind {
    /// Part of the header-rooted next-IFD chain
    Main,
    /// Standalone directory referenced through a tag (EXIF, GPS)
    Custom,
    /// Child directory referenced through the parent's SubIFDs tag
    Sub,
}

/// A decoded directory entry.
///
/// Type and count are derived from the value, so they always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub tag: u16,
    pub value: TagValue,
}

impl Entry {
    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    pub fn count(&self) -> u64 {
        self.value.count()
    }
}

/// Where an entry's value landed in the last committed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSpan {
    /// Absolute file offset of the value bytes (slot position when inline)
    pub offset: u64,

    /// Encoded length of the value
    pub len: u64,

    /// Whether the value sits inside the entry slot
    pub inline: bool,
}

/// Membership of a sub-directory in a pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubSlot {
    pub batch: u64,
    pub index: usize,
}

/// An editable Image File Directory.
#[derive(Debug, Clone)]
pub struct Directory {
    pub(crate) kind: DirectoryKind,
    pub(crate) entries: BTreeMap<u16, Entry>,
    pub(crate) disk_offset: Option<u64>,
    pub(crate) raw_byte_size: u64,
    pub(crate) next_ifd_offset: u64,
    pub(crate) value_spans: BTreeMap<u16, ValueSpan>,
    pub(crate) strile_layout: Option<StrileLayout>,
    pub(crate) sub_slot: Option<SubSlot>,
}

impl Directory {
    /// An empty, never written directory.
    pub fn new(kind: DirectoryKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
            disk_offset: None,
            raw_byte_size: 0,
            next_ifd_offset: 0,
            value_spans: BTreeMap::new(),
            strile_layout: None,
            sub_slot: None,
        }
    }

    /// Load and decode the directory at `offset`.
    ///
    /// Entries with field type codes the format does not define are dropped
    /// with a warning; their bytes stay in the file but are no longer
    /// referenced once the directory is rewritten.
    pub async fn load<S: RandomAccessStore>(
        store: &mut S,
        header: &TiffHeader,
        offset: u64,
        kind: DirectoryKind,
    ) -> Result<Self, TiffError> {
        let raw = RawIfd::read(store, header, offset).await?;
        let raw_byte_size = raw.footprint(header);

        let slot_pos = header.ifd_entry_size() - header.value_offset_size();
        let mut entries = BTreeMap::new();
        let mut value_spans = BTreeMap::new();
        let mut reader = ValueReader::new(store, header);

        for (i, entry) in raw.entries.iter().enumerate() {
            let Some(len) = entry.value_byte_size() else {
                warn!(
                    tag = entry.tag_id,
                    field_type = entry.field_type_raw,
                    offset,
                    "Skipping entry with unknown field type"
                );
                continue;
            };

            let value = match reader.read_value(entry).await {
                Ok(value) => value,
                Err(TiffError::UnsupportedType(code)) => {
                    warn!(
                        tag = entry.tag_id,
                        field_type = code,
                        offset,
                        "Skipping entry with type not allowed in this file class"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let span_offset = if entry.is_inline {
                offset
                    + header.ifd_count_size() as u64
                    + (i * header.ifd_entry_size() + slot_pos) as u64
            } else {
                entry.value_offset(header)
            };
            value_spans.insert(
                entry.tag_id,
                ValueSpan {
                    offset: span_offset,
                    len,
                    inline: entry.is_inline,
                },
            );
            entries.insert(
                entry.tag_id,
                Entry {
                    tag: entry.tag_id,
                    value,
                },
            );
        }

        let mut directory = Directory {
            kind,
            entries,
            disk_offset: Some(offset),
            raw_byte_size,
            next_ifd_offset: raw.next_ifd_offset,
            value_spans,
            strile_layout: None,
            sub_slot: None,
        };
        directory.strile_layout = StrileLayout::detect(&directory);

        Ok(directory)
    }

    // -------------------------------------------------------------------------
    // Entry access
    // -------------------------------------------------------------------------

    /// Set an entry, checking that the declared type and count match the value.
    pub fn set_entry(
        &mut self,
        tag: u16,
        field_type: FieldType,
        count: u64,
        value: TagValue,
    ) -> Result<(), TiffError> {
        if value.field_type() != field_type || value.count() != count {
            return Err(TiffError::InvalidTagValue {
                tag,
                message: format!(
                    "declared {:?} x {} but value is {:?} x {}",
                    field_type,
                    count,
                    value.field_type(),
                    value.count()
                ),
            });
        }
        self.set_value(tag, value);
        Ok(())
    }

    /// Set an entry, replacing any previous value for the tag.
    pub fn set_value(&mut self, tag: impl Into<u16>, value: TagValue) {
        let tag = tag.into();
        self.entries.insert(tag, Entry { tag, value });
    }

    /// Look up an entry.
    pub fn get_entry(&self, tag: impl Into<u16>) -> Option<&Entry> {
        self.entries.get(&tag.into())
    }

    /// Look up a value, failing with `TagNotFound` when absent.
    pub fn value(&self, tag: impl Into<u16>) -> Result<&TagValue, TiffError> {
        let tag = tag.into();
        self.entries
            .get(&tag)
            .map(|entry| &entry.value)
            .ok_or(TiffError::TagNotFound(tag))
    }

    /// Remove an entry, returning its value.
    pub fn remove_entry(&mut self, tag: impl Into<u16>) -> Option<TagValue> {
        self.entries.remove(&tag.into()).map(|entry| entry.value)
    }

    /// Entries in ascending tag order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -------------------------------------------------------------------------
    // Placement state
    // -------------------------------------------------------------------------

    pub fn kind(&self) -> DirectoryKind {
        self.kind
    }

    /// Offset of the last committed form, `None` if never written.
    pub fn disk_offset(&self) -> Option<u64> {
        self.disk_offset
    }

    /// Size of the last committed form, 0 if never written.
    pub fn raw_byte_size(&self) -> u64 {
        self.raw_byte_size
    }

    /// Next-IFD pointer as last read or written.
    pub fn next_ifd_offset(&self) -> u64 {
        self.next_ifd_offset
    }

    /// Where each value landed in the last committed form.
    pub fn value_span(&self, tag: impl Into<u16>) -> Option<ValueSpan> {
        self.value_spans.get(&tag.into()).copied()
    }

    /// Strip/tile array layout, if declared or detected.
    pub fn strile_layout(&self) -> Option<&StrileLayout> {
        self.strile_layout.as_ref()
    }
}

// =============================================================================
// Tests
// =============================================================================
