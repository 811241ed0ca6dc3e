//! Strip and tile ("strile") offset arrays.
//!
//! Image data is located through two parallel arrays in a directory: the file
//! offset of each strip or tile and its byte count. They are the only entries
//! whose values depend on where other data landed, so they get their own
//! bookkeeping.
//!
//! Two policies decide when the arrays reach the file:
//!
//! - **Immediate**: data is written first and the arrays go out with the next
//!   commit like any other entry.
//! - **Deferred**: the directory is committed first with zero-filled arrays of
//!   the final length, data is written afterwards, and the arrays are patched
//!   in place at the locations recorded by that commit. Patching never moves
//!   the directory.

use crate::error::TiffError;

use super::directory::Directory;
use super::tags::{FieldType, TiffTag};
use super::values::TagValue;

/// Whether the image is organized in strips or tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrileKind {
    Strips,
    Tiles,
}

impl StrileKind {
    pub const fn offsets_tag(self) -> TiffTag {
        match self {
            StrileKind::Strips => TiffTag::StripOffsets,
            StrileKind::Tiles => TiffTag::TileOffsets,
        }
    }

    pub const fn byte_counts_tag(self) -> TiffTag {
        match self {
            StrileKind::Strips => TiffTag::StripByteCounts,
            StrileKind::Tiles => TiffTag::TileByteCounts,
        }
    }
}

/// When the offset arrays are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayPolicy {
    /// Arrays are written with the directory on every commit
    #[default]
    Immediate,
    /// Arrays are reserved at commit and patched after the data is written
    Deferred,
}

/// Strile arrays carried by a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrileLayout {
    pub kind: StrileKind,
    pub policy: ArrayPolicy,
    pub count: usize,
}

impl StrileLayout {
    /// Infer the layout of a loaded directory from the tags it carries.
    ///
    /// Tiles win when both sets are present. Loaded arrays use the
    /// immediate policy.
    pub(crate) fn detect(directory: &Directory) -> Option<Self> {
        [StrileKind::Tiles, StrileKind::Strips]
            .into_iter()
            .find_map(|kind| {
                let offsets = directory.get_entry(kind.offsets_tag())?;
                Some(StrileLayout {
                    kind,
                    policy: ArrayPolicy::Immediate,
                    count: offsets.count() as usize,
                })
            })
    }
}

/// Encode an offset or byte-count array.
///
/// `preferred` is the type the array had before; it is kept when every value
/// still fits, so rewriting a loaded directory does not change entry sizes
/// needlessly. Otherwise LONG is used in classic files and LONG8 in BigTIFF.
pub(crate) fn array_value(
    tag: u16,
    values: &[u64],
    preferred: Option<FieldType>,
    is_bigtiff: bool,
) -> Result<TagValue, TiffError> {
    let max = values.iter().copied().max().unwrap_or(0);

    match preferred {
        Some(FieldType::Short) if max <= u16::MAX as u64 => {
            return Ok(TagValue::Short(values.iter().map(|&v| v as u16).collect()));
        }
        Some(FieldType::Long) if max <= u32::MAX as u64 => {
            return Ok(TagValue::Long(values.iter().map(|&v| v as u32).collect()));
        }
        _ => {}
    }

    if is_bigtiff {
        Ok(TagValue::Long8(values.to_vec()))
    } else if max <= u32::MAX as u64 {
        Ok(TagValue::Long(values.iter().map(|&v| v as u32).collect()))
    } else {
        Err(TiffError::InvalidTagValue {
            tag,
            message: format!("value {} does not fit a classic strile array", max),
        })
    }
}

impl Directory {
    /// Reserve strile arrays of `count` entries, zero filled.
    pub(crate) fn declare_striles(
        &mut self,
        kind: StrileKind,
        count: usize,
        policy: ArrayPolicy,
        is_bigtiff: bool,
    ) -> Result<(), TiffError> {
        // A directory carries one organization; drop the other pair
        for other in [StrileKind::Strips, StrileKind::Tiles] {
            if other != kind {
                self.remove_entry(other.offsets_tag());
                self.remove_entry(other.byte_counts_tag());
            }
        }

        let zeros = vec![0u64; count];
        for tag in [kind.offsets_tag(), kind.byte_counts_tag()] {
            self.set_value(tag, array_value(tag.as_u16(), &zeros, None, is_bigtiff)?);
        }
        self.strile_layout = Some(StrileLayout {
            kind,
            policy,
            count,
        });
        Ok(())
    }

    /// Current strile offsets.
    pub fn strile_offsets(&self) -> Result<Vec<u64>, TiffError> {
        self.strile_array(|kind| kind.offsets_tag())
    }

    /// Current strile byte counts.
    pub fn strile_byte_counts(&self) -> Result<Vec<u64>, TiffError> {
        self.strile_array(|kind| kind.byte_counts_tag())
    }

    fn strile_array(&self, tag_of: fn(StrileKind) -> TiffTag) -> Result<Vec<u64>, TiffError> {
        let layout = self
            .strile_layout
            .ok_or(TiffError::TagNotFound(TiffTag::StripOffsets.as_u16()))?;
        let tag = tag_of(layout.kind);
        let value = self.value(tag)?;
        value.as_u64_vec().ok_or_else(|| TiffError::InvalidTagValue {
            tag: tag.as_u16(),
            message: format!("{:?} is not an integer array", value.field_type()),
        })
    }

    /// Record where strile `index` landed.
    pub(crate) fn record_strile(
        &mut self,
        index: usize,
        offset: u64,
        byte_count: u64,
        is_bigtiff: bool,
    ) -> Result<(), TiffError> {
        let layout = self
            .strile_layout
            .ok_or(TiffError::TagNotFound(TiffTag::StripOffsets.as_u16()))?;
        if index >= layout.count {
            return Err(TiffError::InvalidTagValue {
                tag: layout.kind.offsets_tag().as_u16(),
                message: format!("strile {} out of range ({} declared)", index, layout.count),
            });
        }

        for (tag, value) in [
            (layout.kind.offsets_tag(), offset),
            (layout.kind.byte_counts_tag(), byte_count),
        ] {
            let current = self.value(tag)?;
            let preferred = current.field_type();
            let mut values = current.as_u64_vec().unwrap_or_default();
            values.resize(layout.count, 0);
            values[index] = value;
            self.set_value(
                tag,
                array_value(tag.as_u16(), &values, Some(preferred), is_bigtiff)?,
            );
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
