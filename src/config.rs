//! Command-line configuration for `tiffdir`.
//!
//! Each subcommand has its own argument struct with a `validate()` method,
//! so the binary can report bad input before touching any file.
//!
//! # Environment Variables
//!
//! - `TIFFDIR_FILE` - File to operate on when no path argument is given
//! - `TIFFDIR_JSON` - Emit JSON from `inspect` (default: false)
//! - `TIFFDIR_VERBOSE` - Enable debug logging (default: false)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::tiff::TiffTag;

// =============================================================================
// Default Values
// =============================================================================

/// Tag edited by `set-text` when none is given.
pub const DEFAULT_TEXT_TAG: u16 = TiffTag::ImageDescription.as_u16();

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiffdir - inspect and edit TIFF directories in place.
///
/// Rewrites only the directories that change. A directory that no longer
/// fits where it was is moved to the end of the file and relinked.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiffdir")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the header, directory chain and entries of a file.
    Inspect(InspectConfig),

    /// Validate the directory chain of a file.
    Check(CheckConfig),

    /// Set an ASCII tag in one directory and write it back.
    SetText(SetTextConfig),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Inspect(config) => config.verbose,
            Command::Check(config) => config.verbose,
            Command::SetText(config) => config.verbose,
        }
    }
}

/// Arguments of `tiffdir inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// TIFF or BigTIFF file to read.
    #[arg(env = "TIFFDIR_FILE")]
    pub path: PathBuf,

    /// Emit the report as JSON.
    #[arg(long, default_value_t = false, env = "TIFFDIR_JSON")]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, env = "TIFFDIR_VERBOSE")]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)
    }
}

/// Arguments of `tiffdir check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// TIFF or BigTIFF file to validate.
    #[arg(env = "TIFFDIR_FILE")]
    pub path: PathBuf,

    /// Treat warnings as failures.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, env = "TIFFDIR_VERBOSE")]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)
    }
}

/// Arguments of `tiffdir set-text`.
#[derive(Args, Debug, Clone)]
pub struct SetTextConfig {
    /// TIFF or BigTIFF file to edit.
    #[arg(env = "TIFFDIR_FILE")]
    pub path: PathBuf,

    /// Tag to set.
    #[arg(long, default_value_t = DEFAULT_TEXT_TAG)]
    pub tag: u16,

    /// New text. Stored as ASCII with a terminating NUL.
    #[arg(long)]
    pub value: String,

    /// Main directory to edit, by chain index.
    #[arg(long, conflicts_with = "offset")]
    pub directory: Option<usize>,

    /// Directory to edit, by file offset.
    #[arg(long)]
    pub offset: Option<u64>,

    /// Treat the directory at `--offset` as a custom directory (EXIF, GPS).
    ///
    /// Custom directories are not relinked when they move; the new offset is
    /// printed so the referring tag can be updated.
    #[arg(long, default_value_t = false, requires = "offset")]
    pub custom: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, env = "TIFFDIR_VERBOSE")]
    pub verbose: bool,
}

impl SetTextConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)?;

        if self.tag == 0 {
            return Err("tag must be a non-zero tag number".to_string());
        }

        if !self.value.is_ascii() {
            return Err("value must be ASCII text".to_string());
        }

        if self.value.contains('\0') {
            return Err("value must not contain NUL characters".to_string());
        }

        if self.directory.is_some() && self.offset.is_some() {
            return Err("use either --directory or --offset, not both".to_string());
        }

        if self.custom && self.offset.is_none() {
            return Err("--custom requires --offset".to_string());
        }

        if let Some(offset) = self.offset {
            if offset % 2 == 1 {
                return Err(format!("offset {} is not word aligned", offset));
            }
        }

        Ok(())
    }

    /// Directory index to edit when no offset was given.
    pub fn directory_index(&self) -> usize {
        self.directory.unwrap_or(0)
    }
}

fn validate_path(path: &std::path::Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("a file path is required. Pass it as an argument or set TIFFDIR_FILE".to_string());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
