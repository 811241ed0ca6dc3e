//! Structural validation of a TIFF file's directory chain.
//!
//! Walks the main chain the same way the writer does and reports everything
//! that would make a later write-back unsafe: pointers outside the file,
//! directories on odd offsets, loops, truncated entry blocks, entries out of
//! tag order and out-of-line values that run past the end of the file.
//!
//! Problems that readers commonly tolerate (unknown field types, values on
//! odd offsets) are reported as warnings and do not make the file invalid.

use std::collections::HashSet;

use thiserror::Error;

use crate::error::TiffError;
use crate::io::RandomAccessStore;

use super::chain::MAX_DIRECTORIES;
use super::directory::RawIfd;
use super::parser::{TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

// =============================================================================
// Validation Result
// =============================================================================

/// Result of validating a file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the chain is safe to write back to
    pub is_valid: bool,

    /// List of validation errors (empty if valid)
    pub errors: Vec<ValidationError>,

    /// List of validation warnings (non-fatal issues)
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a successful validation result.
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Create a failed validation result with a single error.
    pub fn error(error: ValidationError) -> Self {
        ValidationResult {
            is_valid: false,
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Convert to a TiffError if invalid.
    ///
    /// Returns the first error as a TiffError, or Ok(()) if valid.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            Some(error) if !self.is_valid => Err(error.into()),
            _ => Ok(()),
        }
    }
}

/// A specific validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("directory {index}: offset {offset} is outside the file")]
    DirectoryOutOfBounds { index: usize, offset: u64 },

    #[error("directory {index}: offset {offset} is not word aligned")]
    MisalignedDirectory { index: usize, offset: u64 },

    #[error("directory {index}: offset {offset} was already visited")]
    ChainLoop { index: usize, offset: u64 },

    #[error("directory {index}: entry block at {offset} runs past the end of the file")]
    TruncatedDirectory { index: usize, offset: u64 },

    #[error("directory {index}: tag {tag} follows tag {previous}")]
    UnsortedEntries {
        index: usize,
        tag: u16,
        previous: u16,
    },

    #[error("directory {index}: tag {tag} appears more than once")]
    DuplicateTag { index: usize, tag: u16 },

    #[error("directory {index}: tag {tag} value at {offset} ({len} bytes) runs past the end of the file")]
    ValueOutOfBounds {
        index: usize,
        tag: u16,
        offset: u64,
        len: u64,
    },

    #[error("chain has more than {limit} directories")]
    TooManyDirectories { limit: usize },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::DirectoryOutOfBounds { offset, .. }
            | ValidationError::MisalignedDirectory { offset, .. }
            | ValidationError::TruncatedDirectory { offset, .. } => {
                TiffError::InvalidIfdOffset(offset)
            }
            ValidationError::ChainLoop { offset, .. } => TiffError::ChainLoop(offset),
            ValidationError::UnsortedEntries { tag, .. }
            | ValidationError::DuplicateTag { tag, .. }
            | ValidationError::ValueOutOfBounds { tag, .. } => TiffError::InvalidTagValue {
                tag,
                message: error.to_string(),
            },
            ValidationError::TooManyDirectories { limit } => {
                TiffError::ChainLoop(limit as u64)
            }
        }
    }
}

// =============================================================================
// IFD Validation
// =============================================================================

/// Validate a single entry block.
///
/// Checks tag order, duplicates and that out-of-line values lie inside the
/// file. Unknown field types and odd value offsets are warnings.
pub fn validate_ifd(
    ifd: &RawIfd,
    index: usize,
    header: &TiffHeader,
    file_size: u64,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let mut previous: Option<u16> = None;

    for entry in &ifd.entries {
        match previous {
            Some(prev) if prev == entry.tag_id => {
                result.add_error(ValidationError::DuplicateTag {
                    index,
                    tag: entry.tag_id,
                });
            }
            Some(prev) if prev > entry.tag_id => {
                result.add_error(ValidationError::UnsortedEntries {
                    index,
                    tag: entry.tag_id,
                    previous: prev,
                });
            }
            _ => {}
        }
        previous = Some(entry.tag_id);

        let Some(len) = entry.value_byte_size() else {
            result.add_warning(format!(
                "directory {}: tag {} has unknown field type {}",
                index, entry.tag_id, entry.field_type_raw
            ));
            continue;
        };

        if entry.is_inline {
            continue;
        }

        let offset = entry.value_offset(header);
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= file_size);
        if !in_bounds {
            result.add_error(ValidationError::ValueOutOfBounds {
                index,
                tag: entry.tag_id,
                offset,
                len,
            });
        } else if offset % 2 == 1 {
            result.add_warning(format!(
                "directory {}: tag {} value at odd offset {}",
                index, entry.tag_id, offset
            ));
        }
    }

    result
}

// =============================================================================
// File Validation
// =============================================================================

/// Validate the header and the whole main chain of `store`.
///
/// Header problems and I/O failures are returned as errors; everything found
/// in the chain is collected into the result.
pub async fn validate_file<S: RandomAccessStore>(
    store: &mut S,
) -> Result<ValidationResult, TiffError> {
    let file_size = store.size();
    if file_size < TIFF_HEADER_SIZE as u64 {
        return Err(TiffError::FileTooSmall {
            required: TIFF_HEADER_SIZE as u64,
            actual: file_size,
        });
    }

    let len = file_size.min(BIGTIFF_HEADER_SIZE as u64) as usize;
    let bytes = store.read_exact_at(0, len).await?;
    let header = match TiffHeader::parse(&bytes, file_size) {
        Ok(header) => header,
        Err(TiffError::InvalidIfdOffset(offset)) => {
            return Ok(ValidationResult::error(
                ValidationError::DirectoryOutOfBounds { index: 0, offset },
            ));
        }
        Err(e) => return Err(e),
    };

    let mut result = ValidationResult::ok();
    let mut seen = HashSet::new();
    let mut current = header.first_ifd_offset;
    let mut index = 0;

    if current == 0 {
        result.add_warning("file has no directories".to_string());
    }

    while current != 0 {
        if index >= MAX_DIRECTORIES {
            result.add_error(ValidationError::TooManyDirectories {
                limit: MAX_DIRECTORIES,
            });
            break;
        }
        if !seen.insert(current) {
            result.add_error(ValidationError::ChainLoop {
                index,
                offset: current,
            });
            break;
        }
        if current < header.header_size() as u64 || current >= file_size {
            result.add_error(ValidationError::DirectoryOutOfBounds {
                index,
                offset: current,
            });
            break;
        }
        if current % 2 == 1 {
            result.add_error(ValidationError::MisalignedDirectory {
                index,
                offset: current,
            });
        }

        let ifd = match RawIfd::read(store, &header, current).await {
            Ok(ifd) => ifd,
            Err(TiffError::InvalidIfdOffset(offset)) => {
                result.add_error(ValidationError::TruncatedDirectory { index, offset });
                break;
            }
            Err(e) => return Err(e),
        };

        result.merge(validate_ifd(&ifd, index, &header, file_size));
        current = ifd.next_ifd_offset;
        index += 1;
    }

    Ok(result)
}

// =============================================================================
// Tests
// =============================================================================
