//! Human and machine readable reports of a file's directory layout.
//!
//! Used by the `tiffdir inspect` command. The report mirrors what the writer
//! sees: chain order, offsets, footprints and where each value lives.

use std::fmt;

use serde::Serialize;

use crate::error::TiffError;
use crate::format::tiff::{
    ByteOrder, Directory, DirectoryLocation, TagValue, TiffTag, TiffWriter,
};
use crate::io::RandomAccessStore;

/// Longest value summary before it is cut.
const MAX_SUMMARY_CHARS: usize = 60;

/// Values listed before the rest are elided.
const MAX_SUMMARY_VALUES: usize = 8;

/// Tags whose values are offsets of other directories.
const POINTER_TAGS: [TiffTag; 3] = [TiffTag::SubIfds, TiffTag::ExifIfd, TiffTag::GpsIfd];

// =============================================================================
// Report Types
// =============================================================================

/// Layout of a whole file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    /// Store identifier (file path)
    pub file: String,

    /// "little-endian" or "big-endian"
    pub byte_order: String,

    /// Whether the file uses 64-bit offsets
    pub bigtiff: bool,

    /// File size in bytes
    pub file_size: u64,

    /// Main directories in chain order
    pub directories: Vec<DirectoryReport>,
}

/// One main directory.
#[derive(Debug, Serialize)]
pub struct DirectoryReport {
    /// Position in the main chain
    pub index: usize,

    /// File offset of the entry block
    pub offset: u64,

    /// Number of decoded entries
    pub entry_count: usize,

    /// Bytes owned at `offset` (entry block plus trailing values)
    pub footprint: u64,

    /// Next-IFD pointer (0 for the last directory)
    pub next: u64,

    /// Offsets of directories referenced through SubIFDs, EXIF or GPS tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub linked_directories: Vec<u64>,

    /// Entries in tag order
    pub entries: Vec<EntryReport>,
}

/// One entry.
#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub tag: u16,

    /// Tag name when the tag is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub field_type: String,

    pub count: u64,

    /// Whether the value sits in the entry slot
    pub inline: bool,

    /// Short rendering of the value
    pub value: String,
}

// =============================================================================
// Building
// =============================================================================

/// Build the report for the file behind `writer`.
pub async fn inspect_file<S: RandomAccessStore>(
    writer: &mut TiffWriter<S>,
) -> Result<FileReport, TiffError> {
    let header = *writer.header();
    let offsets = writer.directory_offsets().await?;

    let mut directories = Vec::with_capacity(offsets.len());
    for (index, offset) in offsets.into_iter().enumerate() {
        let directory = writer
            .seek_directory(DirectoryLocation::Offset(offset))
            .await?;
        directories.push(directory_report(index, offset, &directory));
    }

    Ok(FileReport {
        file: writer.store().identifier().to_string(),
        byte_order: match header.byte_order {
            ByteOrder::LittleEndian => "little-endian".to_string(),
            ByteOrder::BigEndian => "big-endian".to_string(),
        },
        bigtiff: header.is_bigtiff,
        file_size: writer.store().size(),
        directories,
    })
}

fn directory_report(index: usize, offset: u64, directory: &Directory) -> DirectoryReport {
    let linked_directories = POINTER_TAGS
        .iter()
        .filter_map(|&tag| directory.get_entry(tag))
        .filter_map(|entry| entry.value.as_u64_vec())
        .flatten()
        .collect();

    let entries = directory
        .entries()
        .map(|entry| EntryReport {
            tag: entry.tag,
            name: TiffTag::from_u16(entry.tag).map(|tag| format!("{:?}", tag)),
            field_type: format!("{:?}", entry.field_type()),
            count: entry.count(),
            inline: directory
                .value_span(entry.tag)
                .is_some_and(|span| span.inline),
            value: summarize(&entry.value),
        })
        .collect();

    DirectoryReport {
        index,
        offset,
        entry_count: directory.len(),
        footprint: directory.raw_byte_size(),
        next: directory.next_ifd_offset(),
        linked_directories,
        entries,
    }
}

/// Render a value in one short line.
pub fn summarize(value: &TagValue) -> String {
    fn list<T: fmt::Display>(items: &[T]) -> String {
        let shown: Vec<String> = items
            .iter()
            .take(MAX_SUMMARY_VALUES)
            .map(|item| item.to_string())
            .collect();
        let mut out = shown.join(", ");
        if items.len() > MAX_SUMMARY_VALUES {
            out.push_str(&format!(", ... (+{} more)", items.len() - MAX_SUMMARY_VALUES));
        }
        out
    }

    match value {
        TagValue::Ascii(text) => {
            let mut shown: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
            if text.chars().count() > MAX_SUMMARY_CHARS {
                shown.push_str("...");
            }
            format!("{:?}", shown)
        }
        TagValue::Byte(bytes) | TagValue::Undefined(bytes) => format!("<{} bytes>", bytes.len()),
        TagValue::SByte(v) => list(v),
        TagValue::Short(v) => list(v),
        TagValue::SShort(v) => list(v),
        TagValue::Long(v) | TagValue::Ifd(v) => list(v),
        TagValue::SLong(v) => list(v),
        TagValue::Long8(v) | TagValue::Ifd8(v) => list(v),
        TagValue::SLong8(v) => list(v),
        TagValue::Float(v) => list(v),
        TagValue::Double(v) => list(v),
        TagValue::Rational(v) => {
            let items: Vec<String> = v.iter().map(|(n, d)| format!("{}/{}", n, d)).collect();
            list(&items)
        }
        TagValue::SRational(v) => {
            let items: Vec<String> = v.iter().map(|(n, d)| format!("{}/{}", n, d)).collect();
            list(&items)
        }
    }
}

// =============================================================================
// Text Rendering
// =============================================================================

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} {}, {} bytes, {} directories",
            self.file,
            if self.bigtiff { "BigTIFF" } else { "TIFF" },
            self.byte_order,
            self.file_size,
            self.directories.len()
        )?;

        for dir in &self.directories {
            writeln!(
                f,
                "\nIFD {} @ {} ({} entries, {} bytes, next {})",
                dir.index, dir.offset, dir.entry_count, dir.footprint, dir.next
            )?;
            if !dir.linked_directories.is_empty() {
                writeln!(f, "  linked directories: {:?}", dir.linked_directories)?;
            }
            for entry in &dir.entries {
                writeln!(
                    f,
                    "  {:>5} {:<26} {:<9} x{:<6} {} {}",
                    entry.tag,
                    entry.name.as_deref().unwrap_or("-"),
                    entry.field_type,
                    entry.count,
                    if entry.inline { "inline" } else { "      " },
                    entry.value
                )?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
