//! TIFF directory write-back.
//!
//! This module reads, edits and rewrites the Image File Directories of TIFF
//! and BigTIFF files without rewriting the rest of the file.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. Everything the writer emits uses the same order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. Entry, count and pointer widths follow from that.
//!
//! - **IFD (Image File Directory)**: A sorted list of tagged entries plus a pointer to
//!   the next directory. Main directories form a chain rooted in the header; custom
//!   and sub-directories are reached through tags.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.
//!
//! - **Placement**: A rewritten directory stays where it was if it still fits, and is
//!   moved to the end of the file otherwise. Whatever pointed at it is repaired.

mod chain;
mod directory;
mod parser;
mod placement;
mod serializer;
mod strile;
mod tags;
mod validation;
mod values;
mod writer;

pub use chain::{ChainLink, ChainWalker, MAX_DIRECTORIES};
pub use directory::{Directory, DirectoryKind, Entry, IfdEntry, RawIfd, ValueSpan};
pub use parser::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use placement::{decide, Placement, PlacementRequest};
pub use serializer::SerializedDirectory;
pub use strile::{ArrayPolicy, StrileKind, StrileLayout};
pub use tags::{FieldType, TiffTag};
pub use validation::{validate_file, validate_ifd, ValidationError, ValidationResult};
pub use values::{check_supported, TagValue, ValueReader};
pub use writer::{CommitOutcome, DirectoryLocation, OrphanReport, TiffWriter};
