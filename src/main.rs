use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use histology_curation::{
    check_destination, execute_plan, normalize_dir_arg, read_rows, scan_source, CopyOptions,
    MatchModeSetting, Reconciler, RunConfig, SpreadsheetFormat,
};

/// Copy and re-organize histology slides into the upload directory layout
#[derive(Parser, Debug)]
#[command(name = "rename-histology")]
#[command(about = "Reconcile a slide sheet with scanned images and copy them under canonical names")]
#[command(version)]
struct Args {
    /// Directory holding the image files and the spreadsheet export
    source_dir: String,

    /// Empty (or missing) directory to build the upload tree in
    dest_dir: String,

    /// TOML config file
    #[arg(long, value_name = "FILE", env = "HISTOLOGY_CONFIG")]
    config: Option<PathBuf>,

    /// auto, identity-key or image-id
    #[arg(long, value_name = "MODE")]
    match_mode: Option<MatchModeSetting>,

    /// Image file extension (without the dot)
    #[arg(long, value_name = "EXT")]
    image_ext: Option<String>,

    /// Spreadsheet extension: csv or xlsx
    #[arg(long, value_name = "EXT")]
    sheet_ext: Option<String>,

    /// Plan and log only; copy nothing
    #[arg(long)]
    dry_run: bool,

    /// Skip the SHA-256 check after each copy
    #[arg(long)]
    no_verify: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => {
            info!("Done!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(mode) = args.match_mode {
        config.match_mode = mode;
    }
    if let Some(ext) = &args.image_ext {
        config.image_extension = ext.trim_start_matches('.').to_string();
    }
    if let Some(ext) = &args.sheet_ext {
        SpreadsheetFormat::from_extension(ext)?;
        config.spreadsheet_extension = ext.trim_start_matches('.').to_string();
    }
    if args.no_verify {
        config.verify_copies = false;
    }

    let source_dir = normalize_dir_arg(&args.source_dir);
    let dest_dir = normalize_dir_arg(&args.dest_dir);

    // 1. Source directory: images + exactly one sheet
    let listing = scan_source(
        &source_dir,
        &config.image_extension,
        &config.spreadsheet_extension,
    )?;

    // 2. Sheet rows
    let rows = read_rows(&listing.spreadsheet, &config.donor_prefix)?;

    // 3. Destination must be fresh
    check_destination(&dest_dir)?;

    // 4. Reconcile (all or nothing)
    let plan = Reconciler::new(config.batch_options()).reconcile(&rows, &listing.images)?;

    // 5. Copy
    let options = CopyOptions {
        dry_run: args.dry_run,
        verify: config.verify_copies,
        manifest_name: config.manifest_name.clone(),
    };
    let manifest = execute_plan(&plan, &dest_dir, &options)?;

    info!(
        "{} → {} ({} file(s))",
        source_dir.display(),
        dest_dir.join(plan.batch_root()).display(),
        manifest.entries.len()
    );

    Ok(())
}
