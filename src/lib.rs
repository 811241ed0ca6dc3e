//! # TIFF IFD Writer
//!
//! Write-back engine for the Image File Directories of TIFF and BigTIFF files.
//!
//! Directories are loaded, edited as ordinary values and committed back to the
//! file. Each commit decides whether the directory can be rewritten where it
//! is or has to move to the end of the file, and keeps the chain of main
//! directories linked through every move.
//!
//! ## Features
//!
//! - **In-place rewrites**: a directory that still fits its old footprint stays put
//! - **Relocation with relinking**: grown main directories move and their predecessor is updated
//! - **Custom and sub-directories**: EXIF/GPS style directories and SubIFDs batches
//! - **Strile arrays**: strip/tile offsets written immediately or patched after the data
//! - **Classic and BigTIFF**: both byte orders, 32 and 64-bit offsets
//!
//! ## Architecture
//!
//! - [`io`] - Random-access byte stores (memory and file backed)
//! - [`mod@format`] - TIFF header, directory model, serializer, placement and chain logic
//! - [`inspect`] - Layout reports for the CLI
//! - [`config`] - CLI argument types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiff_ifd_writer::{ByteOrder, MemoryStore, TagValue, TiffTag, TiffWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiff_ifd_writer::TiffError> {
//!     let mut writer = TiffWriter::create(MemoryStore::new(), ByteOrder::LittleEndian, false).await?;
//!
//!     let mut dir = writer.new_directory();
//!     dir.set_value(TiffTag::ImageDescription, TagValue::Ascii("Hello, world!".into()));
//!     let first = writer.commit(&mut dir).await?;
//!
//!     // Shorter text fits where the directory already is
//!     dir.set_value(TiffTag::ImageDescription, TagValue::Ascii("abc".into()));
//!     let second = writer.commit(&mut dir).await?;
//!     assert_eq!(first.offset, second.offset);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod inspect;
pub mod io;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, InspectConfig, SetTextConfig};
pub use error::{IoError, TiffError};
pub use format::is_tiff_header;
pub use format::tiff::{
    validate_file, validate_ifd, ArrayPolicy, ByteOrder, CommitOutcome, Directory,
    DirectoryKind, DirectoryLocation, Entry, FieldType, OrphanReport, Placement, StrileKind,
    TagValue, TiffHeader, TiffTag, TiffWriter, ValidationError, ValidationResult,
    BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use io::{FileStore, MemoryStore, RandomAccessStore};
