//! tiffdir - inspect and edit TIFF directories in place.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiff_ifd_writer::{
    config::{CheckConfig, Cli, Command, InspectConfig, SetTextConfig},
    format::is_tiff_header,
    inspect::inspect_file,
    validate_file, DirectoryLocation, FileStore, RandomAccessStore, TagValue, TiffError,
    TiffWriter,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.into_command();
    init_logging(command.verbose());

    match command {
        Command::Inspect(config) => run_inspect(config).await,
        Command::Check(config) => run_check(config).await,
        Command::SetText(config) => run_set_text(config).await,
    }
}

/// Initialize tracing; `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiff_ifd_writer=debug,tiffdir=debug"
    } else {
        "tiff_ifd_writer=warn,tiffdir=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open a file and make sure it looks like TIFF before handing it over.
async fn open_store(path: &std::path::Path) -> Result<FileStore, TiffError> {
    let mut store = FileStore::open(path).await?;
    let probe = store.size().min(8) as usize;
    let bytes = store.read_exact_at(0, probe).await?;
    if !is_tiff_header(&bytes) {
        let magic = bytes
            .get(0..2)
            .map(|m| u16::from_le_bytes([m[0], m[1]]))
            .unwrap_or(0);
        return Err(TiffError::InvalidMagic(magic));
    }
    Ok(store)
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result: Result<_, TiffError> = async {
        let store = open_store(&config.path).await?;
        let mut writer = TiffWriter::open(store).await?;
        inspect_file(&mut writer).await
    }
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Failed to inspect {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", report);
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result: Result<_, TiffError> = async {
        let mut store = open_store(&config.path).await?;
        validate_file(&mut store).await
    }
    .await;

    let validation = match result {
        Ok(validation) => validation,
        Err(e) => {
            println!("✗ {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    for error in &validation.errors {
        println!("✗ {}", error);
    }
    for warning in &validation.warnings {
        println!("! {}", warning);
    }

    let failed = !validation.is_valid || (config.strict && !validation.warnings.is_empty());
    if failed {
        println!(
            "{}: {} error(s), {} warning(s)",
            config.path.display(),
            validation.errors.len(),
            validation.warnings.len()
        );
        ExitCode::FAILURE
    } else {
        println!("✓ {}: directory chain is valid", config.path.display());
        ExitCode::SUCCESS
    }
}

// =============================================================================
// Set-Text Command
// =============================================================================

async fn run_set_text(config: SetTextConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match set_text(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to update {}: {}", config.path.display(), e);
            ExitCode::FAILURE
        }
    }
}

async fn set_text(config: &SetTextConfig) -> Result<(), TiffError> {
    let store = open_store(&config.path).await?;
    let mut writer = TiffWriter::open(store).await?;

    let mut directory = match config.offset {
        Some(offset) if config.custom => writer.read_custom_directory(offset).await?,
        Some(offset) => {
            writer
                .seek_directory(DirectoryLocation::Offset(offset))
                .await?
        }
        None => {
            writer
                .seek_directory(DirectoryLocation::Index(config.directory_index()))
                .await?
        }
    };

    directory.set_value(config.tag, TagValue::Ascii(config.value.clone()));
    let outcome = writer.commit(&mut directory).await?;

    info!(tag = config.tag, offset = outcome.offset, "Tag updated");
    println!("{}", outcome.placement);

    if let Some(orphan) = outcome.orphan {
        warn!(
            "Directory moved from {} to {}; update the tag that points at it",
            orphan.old_offset, orphan.new_offset
        );
    }

    writer.into_store().sync().await?;
    Ok(())
}
