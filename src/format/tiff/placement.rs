//! Placement decisions for directory writes.
//!
//! Deciding where a directory goes is kept separate from doing the write so
//! the rules can be checked without a store. The writer feeds in what it
//! knows about the directory and the file, executes the returned
//! [`Placement`], and then performs whatever linking the placement implies.
//!
//! The rules, in order:
//!
//! 1. Never written: append at the even-rounded end of file.
//! 2. The new form fits in the even-rounded old footprint: overwrite in place.
//!    If the old footprint reaches end of file, the file is truncated to the
//!    new end so a shrink does not leave trailing garbage.
//! 3. The new form is larger and the old footprint ends at end of file: a
//!    custom or sub-directory grows in place. Main directories do not; a grown
//!    main directory always gets a fresh offset.
//! 4. Otherwise: relocate to the even-rounded end of file.

use std::fmt;

use crate::io::round_up_even;

use super::directory::DirectoryKind;

/// What the writer knows when placing a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRequest {
    pub kind: DirectoryKind,

    /// Offset of the last committed form, `None` if never written
    pub disk_offset: Option<u64>,

    /// Bytes owned at `disk_offset`
    pub raw_byte_size: u64,

    /// Size of the new serialized form (even)
    pub new_size: u64,

    /// Current end of file
    pub file_size: u64,
}

/// Where a directory is written and what happens around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// First write, at the end of file
    Append { offset: u64 },

    /// Rewrite over the old footprint. `truncate_to` is set when the old
    /// footprint reached end of file and the new form is smaller.
    InPlace { offset: u64, truncate_to: Option<u64> },

    /// Rewrite at the old offset, extending the file
    GrowAtEnd { offset: u64 },

    /// Write at a fresh offset at the end of file; the old bytes are abandoned
    Relocate { from: u64, to: u64 },

    /// Strile arrays patched inside the existing footprint
    Patched { offset: u64 },
}

impl Placement {
    /// Offset the directory lives at afterwards.
    pub fn offset(&self) -> u64 {
        match *self {
            Placement::Append { offset }
            | Placement::InPlace { offset, .. }
            | Placement::GrowAtEnd { offset }
            | Placement::Patched { offset } => offset,
            Placement::Relocate { to, .. } => to,
        }
    }

    /// Whether the directory moved away from a previous offset.
    pub fn is_relocation(&self) -> bool {
        matches!(self, Placement::Relocate { .. })
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Placement::Append { offset } => write!(f, "appended at {}", offset),
            Placement::InPlace {
                offset,
                truncate_to: Some(end),
            } => write!(f, "rewritten in place at {} (file truncated to {})", offset, end),
            Placement::InPlace { offset, .. } => write!(f, "rewritten in place at {}", offset),
            Placement::GrowAtEnd { offset } => write!(f, "grown in place at {}", offset),
            Placement::Relocate { from, to } => write!(f, "relocated from {} to {}", from, to),
            Placement::Patched { offset } => write!(f, "strile arrays patched at {}", offset),
        }
    }
}

/// Decide where a directory goes.
pub fn decide(request: &PlacementRequest) -> Placement {
    let end_of_file = round_up_even(request.file_size);

    let Some(offset) = request.disk_offset else {
        return Placement::Append { offset: end_of_file };
    };

    let old_end = offset.saturating_add(request.raw_byte_size);
    let reaches_eof = round_up_even(old_end) >= request.file_size;

    if request.new_size <= round_up_even(request.raw_byte_size) {
        let new_end = offset + request.new_size;
        let truncate_to = (reaches_eof && new_end < request.file_size).then_some(new_end);
        return Placement::InPlace {
            offset,
            truncate_to,
        };
    }

    if reaches_eof && request.kind != DirectoryKind::Main {
        return Placement::GrowAtEnd { offset };
    }

    Placement::Relocate {
        from: offset,
        to: end_of_file,
    }
}

// =============================================================================
// Tests
// =============================================================================
