//! File format support.
//!
//! Only TIFF-family files are handled. Detection is limited to the header
//! check the CLI needs before handing a file to the writer.

pub mod tiff;

use self::tiff::TIFF_HEADER_SIZE;

/// Check if the given bytes start like a TIFF or BigTIFF file.
///
/// Only the byte order mark and version are checked; use
/// [`tiff::TiffHeader::parse`] for full validation.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let version = match &bytes[0..2] {
        b"II" => u16::from_le_bytes([bytes[2], bytes[3]]),
        b"MM" => u16::from_be_bytes([bytes[2], bytes[3]]),
        _ => return false,
    };

    version == 42 || version == 43
}
