use thiserror::Error;

/// I/O errors raised by the underlying byte store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the operating system or storage backend
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Backing file not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::Io(err.to_string()),
        }
    }
}

/// Errors raised while reading, serializing or placing TIFF directories
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error from the byte store
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Directory offset points outside the file or at an unusable location
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Field type the format does not define, or not allowed in this file class
    #[error("Unsupported field type: {0}")]
    UnsupportedType(u16),

    /// Tag has unexpected type, count or payload
    #[error("Invalid tag value for tag {tag}: {message}")]
    InvalidTagValue { tag: u16, message: String },

    /// Requested tag is not present in the directory
    #[error("Tag {0} not found in directory")]
    TagNotFound(u16),

    /// Directory bytes at this offset were retired by an earlier relocation
    #[error("Stale directory offset {0}: directory was relocated earlier in this session")]
    StaleDirectoryOffset(u64),

    /// No chain link references a main directory that must relocate
    #[error("No predecessor links to the directory at offset {0}; it is not part of the main chain")]
    PredecessorNotFound(u64),

    /// A custom or sub directory moved and whoever referenced the old offset was not updated
    #[error("Directory relocated from {old_offset} to {new_offset}; external reference is now dangling")]
    OrphanDirectory { old_offset: u64, new_offset: u64 },

    /// Directory index beyond the end of the chain
    #[error("Directory index {index} out of range: chain has {count} directories")]
    DirectoryIndexOutOfRange { index: usize, count: usize },

    /// The next-IFD chain revisits an offset
    #[error("Directory chain loops back to offset {0}")]
    ChainLoop(u64),

    /// A main directory commit was attempted before all sub-directories were written
    #[error("{remaining} sub-directories still have to be committed before their parent")]
    SubDirectoriesPending { remaining: usize },

    /// A deferred array no longer fits the span reserved for it
    #[error("Array for tag {tag} changed size: reserved {reserved} bytes, now needs {actual}")]
    ArraySpanChanged { tag: u16, reserved: u64, actual: u64 },

    /// Operation requires a directory that has been written at least once
    #[error("Directory has not been committed yet")]
    NotCommitted,

    /// Offset does not fit the file class (classic TIFF is limited to 32-bit offsets)
    #[error("Offset {0} cannot be addressed in a classic TIFF file")]
    OffsetOverflow(u64),
}
