//! Directory serialization.
//!
//! A directory is serialized as one contiguous run: the entry block first,
//! then every value too large for its slot, each starting on an even offset.
//! Offsets inside the run are kept relative until the placement engine has
//! picked a base, so the same serialized form can be measured, placed and
//! then finalized without encoding twice.
//!
//! ```text
//! [count][entry 0]..[entry n-1][next][value a][pad?][value b][pad?]...
//!  ^ base                             ^ base + block size
//! ```

use std::collections::BTreeMap;

use crate::error::TiffError;
use crate::io::round_up_even;

use super::directory::{Directory, ValueSpan};
use super::parser::TiffHeader;
use super::values::check_supported;

/// Entry slot that must receive `base + relative` once the base is known.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    slot: usize,
    relative: u64,
}

/// Relative location of one entry's value.
#[derive(Debug, Clone, Copy)]
struct RelativeSpan {
    relative: u64,
    len: u64,
    inline: bool,
}

/// A directory serialized with base-relative offsets.
#[derive(Debug, Clone)]
pub struct SerializedDirectory {
    bytes: Vec<u8>,
    fixups: Vec<Fixup>,
    spans: BTreeMap<u16, RelativeSpan>,
    block_size: u64,
    header: TiffHeader,
}

impl SerializedDirectory {
    /// Serialize `directory` for a file described by `header`.
    ///
    /// Entries come out in ascending tag order. Fails if a value uses a
    /// BigTIFF-only type in a classic file, or if a count or the entry total
    /// does not fit the classic field widths.
    pub fn serialize(directory: &Directory, header: &TiffHeader) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;
        let entry_count = directory.entries.len() as u64;
        let slot_size = header.value_offset_size();

        if !header.is_bigtiff && entry_count > u16::MAX as u64 {
            return Err(TiffError::InvalidTagValue {
                tag: 0,
                message: format!("{} entries exceed the classic limit", entry_count),
            });
        }

        let block_size = header
            .ifd_block_size(entry_count)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: 0,
                message: format!("{} entries overflow the directory size", entry_count),
            })?;
        let mut block = Vec::with_capacity(block_size as usize);
        let mut blob: Vec<u8> = Vec::new();
        let mut fixups = Vec::new();
        let mut spans = BTreeMap::new();

        if header.is_bigtiff {
            byte_order.put_u64(&mut block, entry_count);
        } else {
            byte_order.put_u16(&mut block, entry_count as u16);
        }

        for entry in directory.entries.values() {
            let field_type = entry.field_type();
            check_supported(field_type, header.is_bigtiff)?;

            let count = entry.count();
            byte_order.put_u16(&mut block, entry.tag);
            byte_order.put_u16(&mut block, field_type.as_u16());
            if header.is_bigtiff {
                byte_order.put_u64(&mut block, count);
            } else {
                let narrow = u32::try_from(count).map_err(|_| TiffError::InvalidTagValue {
                    tag: entry.tag,
                    message: format!("count {} exceeds the classic limit", count),
                })?;
                byte_order.put_u32(&mut block, narrow);
            }

            let encoded = entry.value.encode(byte_order);
            let len = encoded.len() as u64;

            if encoded.len() <= slot_size {
                spans.insert(
                    entry.tag,
                    RelativeSpan {
                        relative: block.len() as u64,
                        len,
                        inline: true,
                    },
                );
                block.extend_from_slice(&encoded);
                block.resize(block.len() + slot_size - encoded.len(), 0);
            } else {
                // Block size is even, so every blob start stays even
                let relative = block_size + blob.len() as u64;
                fixups.push(Fixup {
                    slot: block.len(),
                    relative,
                });
                spans.insert(
                    entry.tag,
                    RelativeSpan {
                        relative,
                        len,
                        inline: false,
                    },
                );
                block.resize(block.len() + slot_size, 0);
                blob.extend_from_slice(&encoded);
                if blob.len() % 2 == 1 {
                    blob.push(0);
                }
            }
        }

        header.put_offset(&mut block, directory.next_ifd_offset)?;
        debug_assert_eq!(block.len() as u64, block_size);

        block.extend_from_slice(&blob);

        Ok(Self {
            bytes: block,
            fixups,
            spans,
            block_size,
            header: *header,
        })
    }

    /// Total serialized size, always even.
    pub fn total_size(&self) -> u64 {
        round_up_even(self.bytes.len() as u64)
    }

    /// Position of the next-IFD pointer relative to the base.
    pub fn next_slot(&self) -> u64 {
        self.block_size - self.header.ifd_next_offset_size() as u64
    }

    /// Bytes ready to be written at `base`.
    pub fn finalize(&self, base: u64) -> Result<Vec<u8>, TiffError> {
        if base % 2 == 1 {
            return Err(TiffError::InvalidIfdOffset(base));
        }

        let mut bytes = self.bytes.clone();
        for fixup in &self.fixups {
            let encoded = self.header.encode_offset(base + fixup.relative)?;
            bytes[fixup.slot..fixup.slot + encoded.len()].copy_from_slice(&encoded);
        }
        Ok(bytes)
    }

    /// Absolute value locations once written at `base`.
    pub fn value_spans(&self, base: u64) -> BTreeMap<u16, ValueSpan> {
        self.spans
            .iter()
            .map(|(&tag, span)| {
                (
                    tag,
                    ValueSpan {
                        offset: base + span.relative,
                        len: span.len,
                        inline: span.inline,
                    },
                )
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
